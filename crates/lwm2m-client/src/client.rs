//! LWM2M client runtime.
//!
//! The client owns the registered object instances and processes requests
//! from the transport one at a time:
//! - Read / Write / Execute, routed to the addressed instance
//! - Observe / cancel observation, kept in the observation registry
//!
//! Change events from every instance flow through one channel sink. The
//! client resolves them against the registry and broadcasts a
//! `Notification` per interested observer.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use lwm2m_core::{
    InstanceId, NotificationSink, ObjectEnabler, ObjectId, OperationError, ResourceChanged,
    ResourceId, ResourcePath, ResourceValue,
};

use crate::observation::ObservationRegistry;
use crate::sink::ChannelSink;

/// Errors returned to the transport for a client request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The object instance rejected the operation.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// No instance is registered under the path.
    #[error("no object instance at {0}")]
    UnknownInstance(ResourcePath),

    /// The path does not address what the operation needs.
    #[error("{path}: {reason}")]
    InvalidPath {
        path: ResourcePath,
        reason: &'static str,
    },

    /// The client loop is not running.
    #[error("client is not running")]
    Closed,
}

impl ClientError {
    /// CoAP response code the transport should answer with.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Operation(e) => e.code(),
            ClientError::UnknownInstance(_) => "4.04",
            ClientError::InvalidPath { .. } => "4.00",
            ClientError::Closed => "5.03",
        }
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadContent {
    /// Value of one resource.
    Resource(ResourceValue),
    /// Every readable resource of an instance that has a value.
    Instance(Vec<(ResourceId, ResourceValue)>),
}

/// Requests processed by the client loop.
#[derive(Debug)]
pub enum ClientRequest {
    Read {
        path: ResourcePath,
        reply: oneshot::Sender<Result<ReadContent, ClientError>>,
    },
    Write {
        path: ResourcePath,
        value: ResourceValue,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Execute {
        path: ResourcePath,
        params: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Observe {
        observer: String,
        path: ResourcePath,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    CancelObservation {
        observer: String,
        path: ResourcePath,
        reply: oneshot::Sender<bool>,
    },
}

/// A change delivered to one observer.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub observer: String,
    pub path: ResourcePath,
    /// Value at the time the change was dispatched, if readable.
    pub value: Option<ResourceValue>,
}

/// Registered instances, observations and the outgoing notification channel.
struct ClientState {
    objects: BTreeMap<(ObjectId, InstanceId), Arc<dyn ObjectEnabler>>,
    observations: ObservationRegistry,
    notification_tx: broadcast::Sender<Notification>,
}

impl ClientState {
    fn instance(&self, path: &ResourcePath) -> Result<&Arc<dyn ObjectEnabler>, ClientError> {
        let instance_id = path.instance_id().ok_or(ClientError::InvalidPath {
            path: *path,
            reason: "an object instance is required",
        })?;
        self.objects
            .get(&(path.object_id(), instance_id))
            .ok_or(ClientError::UnknownInstance(*path))
    }

    fn resource(
        &self,
        path: &ResourcePath,
    ) -> Result<(&Arc<dyn ObjectEnabler>, ResourceId), ClientError> {
        let instance = self.instance(path)?;
        let resource_id = path.resource_id().ok_or(ClientError::InvalidPath {
            path: *path,
            reason: "a resource is required",
        })?;
        Ok((instance, resource_id))
    }

    fn read(&self, path: &ResourcePath) -> Result<ReadContent, ClientError> {
        let instance = self.instance(path)?;
        match path.resource_id() {
            Some(resource_id) => Ok(ReadContent::Resource(instance.read(resource_id)?)),
            None => Ok(ReadContent::Instance(instance.read_all())),
        }
    }

    fn write(&self, path: &ResourcePath, value: ResourceValue) -> Result<(), ClientError> {
        let (instance, resource_id) = self.resource(path)?;
        Ok(instance.write(resource_id, value)?)
    }

    fn execute(&self, path: &ResourcePath, params: Option<&str>) -> Result<(), ClientError> {
        let (instance, resource_id) = self.resource(path)?;
        Ok(instance.execute(resource_id, params)?)
    }

    fn observe(&mut self, observer: &str, path: ResourcePath) -> Result<(), ClientError> {
        match path.instance_id() {
            None => {
                if !self.objects.keys().any(|(object_id, _)| *object_id == path.object_id()) {
                    return Err(ClientError::UnknownInstance(path));
                }
            }
            Some(_) => {
                let instance = self.instance(&path)?;
                if let Some(resource_id) = path.resource_id() {
                    // Absent values may still be observed, unknown ids may not
                    if let Err(e @ OperationError::InvalidResource { .. }) = instance.read(resource_id) {
                        return Err(e.into());
                    }
                }
            }
        }
        self.observations.observe(observer, path);
        Ok(())
    }

    fn handle_request(&mut self, request: ClientRequest) {
        match request {
            ClientRequest::Read { path, reply } => {
                debug!("Read {}", path);
                let _ = reply.send(self.read(&path));
            }
            ClientRequest::Write { path, value, reply } => {
                debug!("Write {} <- {}", path, value);
                let _ = reply.send(self.write(&path, value));
            }
            ClientRequest::Execute {
                path,
                params,
                reply,
            } => {
                debug!("Execute {}", path);
                let _ = reply.send(self.execute(&path, params.as_deref()));
            }
            ClientRequest::Observe {
                observer,
                path,
                reply,
            } => {
                let _ = reply.send(self.observe(&observer, path));
            }
            ClientRequest::CancelObservation {
                observer,
                path,
                reply,
            } => {
                let _ = reply.send(self.observations.cancel(&observer, &path));
            }
        }
    }

    fn dispatch_change(&self, event: ResourceChanged) {
        let observers = self.observations.observers_for(&event);
        if observers.is_empty() {
            trace!("Change of {} has no observers", event.path());
            return;
        }

        let value = self
            .objects
            .get(&(event.object_id, event.instance_id))
            .and_then(|instance| instance.read(event.resource_id).ok());

        for observer in observers {
            let notification = Notification {
                observer,
                path: event.path(),
                value: value.clone(),
            };
            if self.notification_tx.send(notification).is_err() {
                trace!("No notification receivers");
            }
        }
    }
}

/// The LWM2M client.
pub struct Lwm2mClient {
    state: ClientState,
    sink: ChannelSink,
    change_rx: mpsc::UnboundedReceiver<ResourceChanged>,
    request_tx: mpsc::Sender<ClientRequest>,
    request_rx: mpsc::Receiver<ClientRequest>,
}

impl Default for Lwm2mClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Lwm2mClient {
    pub fn new() -> Self {
        let (sink, change_rx) = ChannelSink::new();
        let (request_tx, request_rx) = mpsc::channel(1024);
        let (notification_tx, _) = broadcast::channel(1024);

        Self {
            state: ClientState {
                objects: BTreeMap::new(),
                observations: ObservationRegistry::new(),
                notification_tx,
            },
            sink,
            change_rx,
            request_tx,
            request_rx,
        }
    }

    /// Sink to build object instances with, so their changes reach this client.
    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        Arc::new(self.sink.clone())
    }

    /// Register an object instance, replacing any instance at the same path.
    pub fn register(&mut self, instance: Arc<dyn ObjectEnabler>) -> Option<Arc<dyn ObjectEnabler>> {
        let key = (instance.object_id(), instance.instance_id());
        info!("Registered object instance /{}/{}", key.0, key.1);
        let previous = self.state.objects.insert(key, instance);
        if previous.is_some() {
            warn!("Replaced object instance /{}/{}", key.0, key.1);
        }
        previous
    }

    /// Paths of every registered instance.
    pub fn instances(&self) -> Vec<ResourcePath> {
        self.state
            .objects
            .keys()
            .map(|(object_id, instance_id)| ResourcePath::instance(*object_id, *instance_id))
            .collect()
    }

    /// Handle for submitting requests.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            tx: self.request_tx.clone(),
        }
    }

    /// Receive notifications for all observers.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.state.notification_tx.subscribe()
    }

    /// Process requests and change events until every handle is dropped.
    pub async fn run(self) {
        let Lwm2mClient {
            mut state,
            sink,
            mut change_rx,
            request_tx,
            mut request_rx,
        } = self;
        drop(sink);
        drop(request_tx);

        info!("LWM2M client running with {} object instances", state.objects.len());

        loop {
            tokio::select! {
                biased;

                Some(event) = change_rx.recv() => {
                    state.dispatch_change(event);
                }

                request = request_rx.recv() => {
                    match request {
                        Some(request) => state.handle_request(request),
                        None => {
                            info!("All client handles dropped, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Cloneable handle to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<ClientRequest>,
}

impl ClientHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ClientRequest,
    ) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Read one resource, or every value of an instance.
    pub async fn read(&self, path: ResourcePath) -> Result<ReadContent, ClientError> {
        self.request(|reply| ClientRequest::Read { path, reply }).await?
    }

    pub async fn write(&self, path: ResourcePath, value: ResourceValue) -> Result<(), ClientError> {
        self.request(|reply| ClientRequest::Write { path, value, reply })
            .await?
    }

    pub async fn execute(&self, path: ResourcePath, params: Option<&str>) -> Result<(), ClientError> {
        let params = params.map(String::from);
        self.request(|reply| ClientRequest::Execute {
            path,
            params,
            reply,
        })
        .await?
    }

    pub async fn observe(&self, observer: &str, path: ResourcePath) -> Result<(), ClientError> {
        let observer = observer.to_string();
        self.request(|reply| ClientRequest::Observe {
            observer,
            path,
            reply,
        })
        .await?
    }

    /// Returns false if there was no such observation.
    pub async fn cancel_observation(
        &self,
        observer: &str,
        path: ResourcePath,
    ) -> Result<bool, ClientError> {
        let observer = observer.to_string();
        self.request(|reply| ClientRequest::CancelObservation {
            observer,
            path,
            reply,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwm2m_core::config::BindingMode;
    use lwm2m_core::{ActionError, ResourceContext};
    use lwm2m_objects::{Device, DeviceControl, DeviceResource};

    struct NoopControl;

    impl DeviceControl for NoopControl {
        fn reboot(&mut self, _ctx: &mut ResourceContext<'_, DeviceResource>) -> Result<(), ActionError> {
            Ok(())
        }

        fn factory_reset(
            &mut self,
            _ctx: &mut ResourceContext<'_, DeviceResource>,
        ) -> Result<(), ActionError> {
            Ok(())
        }
    }

    fn client_with_device() -> (Lwm2mClient, Device) {
        let mut client = Lwm2mClient::new();
        let device = Device::with_identity(
            "Acme",
            "X1",
            "123",
            Some(BindingMode::Udp),
            NoopControl,
            client.sink(),
        )
        .unwrap();
        client.register(device.enabler());
        (client, device)
    }

    fn read(state: &mut ClientState, path: &str) -> Result<ReadContent, ClientError> {
        let (reply, mut rx) = oneshot::channel();
        state.handle_request(ClientRequest::Read {
            path: path.parse().unwrap(),
            reply,
        });
        rx.try_recv().unwrap()
    }

    #[test]
    fn test_read_routing() {
        let (mut client, _device) = client_with_device();
        let state = &mut client.state;

        assert_eq!(
            read(state, "/3/0/0").unwrap(),
            ReadContent::Resource(ResourceValue::from("Acme"))
        );
        assert!(matches!(read(state, "/3/0").unwrap(), ReadContent::Instance(_)));

        assert_eq!(
            read(state, "/3/1/0"),
            Err(ClientError::UnknownInstance(ResourcePath::resource(3, 1, 0)))
        );
        assert_eq!(read(state, "/5/0/3").unwrap_err().code(), "4.04");
        assert!(matches!(read(state, "/3"), Err(ClientError::InvalidPath { .. })));

        let err = read(state, "/3/0/99").unwrap_err();
        assert_eq!(
            err,
            ClientError::Operation(OperationError::InvalidResource {
                object_id: 3,
                resource_id: 99,
            })
        );
    }

    #[test]
    fn test_write_requires_resource_path() {
        let (client, _device) = client_with_device();
        let err = client
            .state
            .write(&ResourcePath::instance(3, 0), ResourceValue::from("+01:00"))
            .unwrap_err();
        assert_eq!(err.code(), "4.00");
    }

    #[test]
    fn test_observe_validation() {
        let (mut client, _device) = client_with_device();
        let state = &mut client.state;

        assert!(state.observe("server-1", ResourcePath::object(3)).is_ok());
        assert!(state.observe("server-1", ResourcePath::resource(3, 0, 13)).is_ok());
        // Valid id without a value
        assert!(state.observe("server-1", ResourcePath::resource(3, 0, 9)).is_ok());

        assert_eq!(
            state.observe("server-1", ResourcePath::object(5)),
            Err(ClientError::UnknownInstance(ResourcePath::object(5)))
        );
        assert!(state.observe("server-1", ResourcePath::resource(3, 0, 40)).is_err());
        assert_eq!(state.observations.len(), 3);
    }

    #[test]
    fn test_dispatch_change_to_observers() {
        let (mut client, device) = client_with_device();
        let mut notifications = client.notifications();

        client
            .state
            .observe("server-1", ResourcePath::resource(3, 0, 9))
            .unwrap();
        device.set_battery_level(42, true).unwrap();

        let event = client.change_rx.try_recv().unwrap();
        client.state.dispatch_change(event);

        let notification = notifications.try_recv().unwrap();
        assert_eq!(
            notification,
            Notification {
                observer: "server-1".to_string(),
                path: ResourcePath::resource(3, 0, 9),
                value: Some(ResourceValue::Integer(42)),
            }
        );
        assert!(notifications.try_recv().is_err());
    }

    #[test]
    fn test_register_replaces() {
        let (mut client, device) = client_with_device();
        assert!(client.register(device.enabler()).is_some());
        assert_eq!(client.instances(), vec![ResourcePath::instance(3, 0)]);
    }
}
