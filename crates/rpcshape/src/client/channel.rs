use std::sync::Arc;

use tokio::runtime::Handle;
use tonic::Status;
use tracing::{Instrument, Span, debug, debug_span};
use uuid::Uuid;

use super::config::LocalChannelConfig;
use crate::classify::CallShape;
use crate::descriptor::{MethodInfo, ServiceRegistry};
use crate::handler::MethodHandler;
use crate::marshal::Marshaller;
use crate::payload::Payload;
use crate::sink::{Observer, Sink};
use crate::types::Class;

/// The method a client call targets, as published by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMethodHandle {
    pub service: String,
    pub info: MethodInfo,
}

impl ClientMethodHandle {
    pub fn new(service: impl Into<String>, info: MethodInfo) -> Self {
        Self {
            service: service.into(),
            info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn shape(&self) -> CallShape {
        self.info.shape
    }

    /// `{service}/{method}`
    pub fn path(&self) -> String {
        format!("{}/{}", self.service, self.info.name)
    }
}

/// Carries calls from a client to wherever the service runs.
pub trait Channel: Send + Sync {
    /// Start a call. `responses` receives the service's responses; the
    /// returned sink takes the caller's requests.
    ///
    /// Unary and server-streaming calls take exactly one request followed
    /// by `complete`.
    fn open(&self, method: &ClientMethodHandle, responses: Sink) -> Sink;
}

/// A [`Channel`] that dispatches to services registered in this process.
#[derive(Clone)]
pub struct LocalChannel {
    registry: Arc<ServiceRegistry>,
    runtime: Handle,
    config: LocalChannelConfig,
}

impl LocalChannel {
    /// Unary and server-streaming calls run on `runtime`.
    pub fn new(registry: Arc<ServiceRegistry>, runtime: Handle) -> Self {
        Self {
            registry,
            runtime,
            config: LocalChannelConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LocalChannelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

impl Channel for LocalChannel {
    fn open(&self, method: &ClientMethodHandle, responses: Sink) -> Sink {
        let call_id = Uuid::new_v4();
        let span = debug_span!(
            "call",
            %call_id,
            service = %method.service,
            method = %method.name()
        );

        let Some(descriptor) = self.registry.get(&method.service) else {
            responses.fail(Status::not_found(format!("unknown service '{}'", method.service)));
            return Sink::closed();
        };
        let Some(target) = descriptor.method(method.name()) else {
            responses.fail(Status::not_found(format!("unknown method '{}'", method.path())));
            return Sink::closed();
        };
        let handler = Arc::clone(target.handler());

        let marshaller = self.config.marshal.then(|| Arc::clone(target.marshaller()));
        let responses = match &marshaller {
            Some(marshaller) => remarshal(responses, marshaller, handler.response_type()),
            None => responses,
        };

        let requests = span.in_scope(|| {
            debug!("Opening call");
            match handler.shape() {
                CallShape::Unary | CallShape::ServerStreaming => Sink::new(SingleRequest {
                    handler: Arc::clone(&handler),
                    responses: Some(responses),
                    request: None,
                    runtime: self.runtime.clone(),
                    span: span.clone(),
                }),
                CallShape::ClientStreaming | CallShape::BidiStreaming => {
                    handler.invoke_stream_start(responses)
                }
            }
        });

        match &marshaller {
            Some(marshaller) => remarshal(requests, marshaller, handler.request_type()),
            None => requests,
        }
    }
}

/// Buffers the one request of a unary or server-streaming call and starts
/// the call once the caller completes.
struct SingleRequest {
    handler: Arc<dyn MethodHandler>,
    responses: Option<Sink>,
    request: Option<Payload>,
    runtime: Handle,
    span: Span,
}

impl Observer for SingleRequest {
    fn emit(&mut self, value: Payload) {
        if self.request.is_none() {
            self.request = Some(value);
            return;
        }
        self.request = None;
        if let Some(responses) = self.responses.take() {
            responses.fail(Status::invalid_argument(format!(
                "{} method '{}' takes a single request",
                self.handler.shape(),
                self.handler.method()
            )));
        }
    }

    fn complete(&mut self) {
        let Some(responses) = self.responses.take() else {
            return;
        };
        let request = match self.request.take() {
            Some(request) => request,
            None if self.handler.request_type() == &Class::empty() => Payload::empty(),
            None => {
                return responses.fail(Status::invalid_argument(format!(
                    "no request sent to method '{}'",
                    self.handler.method()
                )));
            }
        };
        let handler = Arc::clone(&self.handler);
        self.runtime.spawn(
            async move {
                handler.invoke_unary(request, responses).await;
                debug!("Call finished");
            }
            .instrument(self.span.clone()),
        );
    }

    fn fail(&mut self, status: Status) {
        self.request = None;
        if let Some(responses) = self.responses.take() {
            responses.fail(status);
        }
    }
}

/// Pass every value through `marshaller` on its way to `downstream`.
fn remarshal(downstream: Sink, marshaller: &Arc<dyn Marshaller>, class: &Class) -> Sink {
    Sink::new(Remarshal {
        marshaller: Arc::clone(marshaller),
        class: class.clone(),
        downstream: Some(downstream),
    })
}

struct Remarshal {
    marshaller: Arc<dyn Marshaller>,
    class: Class,
    downstream: Option<Sink>,
}

impl Observer for Remarshal {
    fn emit(&mut self, value: Payload) {
        let Some(downstream) = self.downstream.as_mut() else {
            return;
        };
        let decoded = self
            .marshaller
            .encode(&value)
            .and_then(|bytes| self.marshaller.decode(&self.class, bytes));
        match decoded {
            Ok(value) => downstream.emit(value),
            Err(status) => {
                if let Some(downstream) = self.downstream.take() {
                    downstream.fail(status);
                }
            }
        }
    }

    fn complete(&mut self) {
        if let Some(downstream) = self.downstream.take() {
            downstream.complete();
        }
    }

    fn fail(&mut self, status: Status) {
        if let Some(downstream) = self.downstream.take() {
            downstream.fail(status);
        }
    }
}
