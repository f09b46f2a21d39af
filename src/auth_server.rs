use core::fmt;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{net::TcpListener, sync::Notify, task::JoinHandle};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::{default_invitation_path, default_listen_address},
    cryptography::KeySource,
    error::{AuthServerBuildError, Error, StartupError, StdIoError},
    flows::invitation::InvitationFlow,
    routes::invitation_router,
    user_manager::AccountStore,
};

pub struct Signals {
    pub stop: Arc<AtomicBool>,
    pub stop_notify: Arc<Notify>,
}

impl Signals {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    pub fn clone_stop(&self) -> Arc<AtomicBool> {
        self.stop.to_owned()
    }

    pub fn clone_stop_notify(&self) -> Arc<Notify> {
        self.stop_notify.to_owned()
    }
}

async fn wait_for_stop(stop: Arc<AtomicBool>, stop_notify: Arc<Notify>) {
    let notified = stop_notify.notified();
    tokio::pin!(notified);
    // Register before checking the flag so a stop between the two is not lost.
    notified.as_mut().enable();
    if stop.load(Ordering::SeqCst) {
        return;
    }
    notified.await;
}

#[derive(Debug)]
pub enum RequiredProperties {
    IssuerUrl,
    KeySource,
    AccountStore,
}

impl fmt::Display for RequiredProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::IssuerUrl => "IssuerUrl",
                Self::KeySource => "KeySource",
                Self::AccountStore => "AccountStore",
            }
        )
    }
}

pub struct Builder<K, S> {
    //required
    issuer_url: Option<String>,
    key_source: Option<Arc<K>>,
    account_store: Option<Arc<S>>,

    //optional
    listen_address: Option<SocketAddr>,
    invitation_path: Option<String>,
    stop: Option<Arc<AtomicBool>>,
    stop_notify: Option<Arc<Notify>>,
}

impl<K, S> Default for Builder<K, S> {
    fn default() -> Self {
        Self {
            issuer_url: None,
            key_source: None,
            account_store: None,
            listen_address: None,
            invitation_path: None,
            stop: None,
            stop_notify: None,
        }
    }
}

impl<K: KeySource, S: AccountStore> Builder<K, S> {
    pub fn issuer_url(mut self, issuer_url: String) -> Self {
        self.issuer_url = Some(issuer_url);
        self
    }

    pub fn key_source(mut self, key_source: Arc<K>) -> Self {
        self.key_source = Some(key_source);
        self
    }

    pub fn account_store(mut self, account_store: Arc<S>) -> Self {
        self.account_store = Some(account_store);
        self
    }

    pub fn listen_address(mut self, listen_address: SocketAddr) -> Self {
        self.listen_address = Some(listen_address);
        self
    }

    pub fn invitation_path(mut self, invitation_path: String) -> Self {
        self.invitation_path = Some(invitation_path);
        self
    }

    pub fn stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn stop_notify(mut self, stop_notify: Arc<Notify>) -> Self {
        self.stop_notify = Some(stop_notify);
        self
    }

    /// Binds the listener and serves in a background task until stopped.
    pub async fn start_server(self) -> Result<AuthServer, Error> {
        let (issuer_url, key_source, account_store) =
            match (self.issuer_url, self.key_source, self.account_store) {
                (Some(issuer_url), Some(key_source), Some(account_store)) => {
                    (issuer_url, key_source, account_store)
                }
                (issuer_url, key_source, account_store) => {
                    let mut missing_properties: Vec<RequiredProperties> = Vec::new();
                    if issuer_url.is_none() {
                        missing_properties.push(RequiredProperties::IssuerUrl);
                    }
                    if key_source.is_none() {
                        missing_properties.push(RequiredProperties::KeySource);
                    }
                    if account_store.is_none() {
                        missing_properties.push(RequiredProperties::AccountStore);
                    }
                    return Err(AuthServerBuildError::MissingProperties(format!(
                        "{:?}",
                        missing_properties
                    ))
                    .into());
                }
            };

        let flow = Arc::new(InvitationFlow::new(issuer_url, key_source, account_store));
        let invitation_path = self
            .invitation_path
            .unwrap_or_else(default_invitation_path);
        let issuer = flow.get_issuer().to_owned();
        let app = invitation_router(flow, &invitation_path).layer(TraceLayer::new_for_http());

        let addr = self.listen_address.unwrap_or_else(default_listen_address);
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => return Err(StartupError::BindListener(StdIoError(err)).into()),
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(err) => return Err(StartupError::BindListener(StdIoError(err)).into()),
        };
        info!(
            "Invitation endpoint for {} listening on {}{}",
            issuer, local_addr, invitation_path
        );

        let signals = Signals {
            stop: self.stop.unwrap_or(Arc::new(AtomicBool::new(false))),
            stop_notify: self.stop_notify.unwrap_or(Arc::new(Notify::new())),
        };
        let shutdown = wait_for_stop(signals.clone_stop(), signals.clone_stop_notify());
        let serve_task: JoinHandle<Result<(), Error>> = tokio::spawn(async move {
            match axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    error!("{}", err);
                    Err(StartupError::Serve(StdIoError(err)).into())
                }
            }
        });

        Ok(AuthServer {
            signals,
            local_addr,
            serve_task,
        })
    }
}

pub struct AuthServer {
    pub signals: Signals,
    local_addr: SocketAddr,
    serve_task: JoinHandle<Result<(), Error>>,
}

impl AuthServer {
    pub fn builder<K: KeySource, S: AccountStore>() -> Builder<K, S> {
        Builder::default()
    }

    pub fn get_local_addr(&self) -> &SocketAddr {
        &self.local_addr
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.signals.stop();
        match self.serve_task.await {
            Ok(result) => result,
            Err(err) => Err(StartupError::ServeTask(err.to_string()).into()),
        }
    }
}
