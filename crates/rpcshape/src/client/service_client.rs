use std::any::Any;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::debug;

use super::channel::{Channel, ClientMethodHandle};
use super::config::ClientConfig;
use super::streams::{self, BlockingStream, ResponseStream, SingleResult};
use crate::classify::CallShape;
use crate::descriptor::ServiceInfo;
use crate::error::ClientError;
use crate::sink::{self, Sink};

/// Calls the methods of one service through a [`Channel`].
///
/// Every call first checks the method against the published
/// [`ServiceInfo`]: an unknown name or a calling style of the wrong shape
/// fails before the channel is touched. Calls are independent; one client
/// may issue any number of them concurrently.
#[derive(Clone)]
pub struct ServiceClient {
    info: Arc<ServiceInfo>,
    channel: Arc<dyn Channel>,
    config: ClientConfig,
}

impl ServiceClient {
    pub fn new(info: ServiceInfo, channel: Arc<dyn Channel>, config: ClientConfig) -> Self {
        Self {
            info: Arc::new(info),
            channel,
            config,
        }
    }

    pub fn service(&self) -> &ServiceInfo {
        &self.info
    }

    /// Check that `method` exists and has the shape the calling style needs.
    pub fn method(&self, method: &str, requested: CallShape) -> Result<ClientMethodHandle, ClientError> {
        let info = self
            .info
            .method(method)
            .ok_or_else(|| ClientError::UnknownMethod {
                service: self.info.name.clone(),
                method: method.to_string(),
            })?;
        if info.shape != requested {
            return Err(ClientError::ShapeMismatch {
                service: self.info.name.clone(),
                method: method.to_string(),
                registered: info.shape,
                requested,
            });
        }
        Ok(ClientMethodHandle::new(self.info.name.clone(), info.clone()))
    }

    fn open_single<T: Any + Send>(&self, handle: &ClientMethodHandle, request: T, responses: Sink) {
        debug!(method = %handle.path(), shape = %handle.shape(), "Issuing call");
        let mut requests = self.channel.open(handle, responses);
        requests.send(request);
        requests.complete();
    }

    async fn wait<R: Any>(&self, result: SingleResult) -> Result<R, ClientError> {
        let payload = timeout(self.config.timeout, result)
            .await?
            .map_err(|_| ClientError::Closed)??;
        streams::downcast(payload)
    }

    /// Send the request from the calling thread and block until the response.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_unary<T, R>(&self, method: &str, request: T) -> Result<R, ClientError>
    where
        T: Any + Send,
        R: Any,
    {
        let handle = self.method(method, CallShape::Unary)?;
        let (responses, result) = streams::single();
        self.open_single(&handle, request, responses);
        let payload = result.blocking_recv().map_err(|_| ClientError::Closed)??;
        streams::downcast(payload)
    }

    /// Send the request and wait for the response, at most the configured
    /// timeout.
    pub async fn unary<T, R>(&self, method: &str, request: T) -> Result<R, ClientError>
    where
        T: Any + Send,
        R: Any,
    {
        let handle = self.method(method, CallShape::Unary)?;
        let (responses, result) = streams::single();
        self.open_single(&handle, request, responses);
        self.wait(result).await
    }

    /// Send the request; the response arrives on `responses`.
    pub fn unary_with_sink<T>(&self, method: &str, request: T, responses: Sink) -> Result<(), ClientError>
    where
        T: Any + Send,
    {
        let handle = self.method(method, CallShape::Unary)?;
        self.open_single(&handle, request, responses);
        Ok(())
    }

    /// Send the request and pull the responses from the calling thread.
    pub fn blocking_server_streaming<T, R>(&self, method: &str, request: T) -> Result<BlockingStream<R>, ClientError>
    where
        T: Any + Send,
        R: Any,
    {
        let handle = self.method(method, CallShape::ServerStreaming)?;
        let (responses, source) = sink::channel();
        self.open_single(&handle, request, responses);
        Ok(BlockingStream::new(source))
    }

    /// Send the request; the responses arrive on `responses`.
    pub fn server_streaming<T>(&self, method: &str, request: T, responses: Sink) -> Result<(), ClientError>
    where
        T: Any + Send,
    {
        let handle = self.method(method, CallShape::ServerStreaming)?;
        self.open_single(&handle, request, responses);
        Ok(())
    }

    /// Send the request and receive the responses as an async stream.
    pub fn server_streaming_stream<T, R>(&self, method: &str, request: T) -> Result<ResponseStream<R>, ClientError>
    where
        T: Any + Send,
        R: Any + Send,
    {
        let handle = self.method(method, CallShape::ServerStreaming)?;
        let (responses, source) = sink::channel();
        self.open_single(&handle, request, responses);
        Ok(ResponseStream::new(source))
    }

    /// Start a client-streaming call. The returned sink takes the requests;
    /// the single response arrives on `responses`.
    pub fn client_streaming_with_sink(&self, method: &str, responses: Sink) -> Result<Sink, ClientError> {
        let handle = self.method(method, CallShape::ClientStreaming)?;
        debug!(method = %handle.path(), shape = %handle.shape(), "Issuing call");
        Ok(self.channel.open(&handle, responses))
    }

    /// Send every request, then wait for the single response.
    pub async fn client_streaming<T, R, I>(&self, method: &str, requests: I) -> Result<R, ClientError>
    where
        T: Any + Send,
        R: Any,
        I: IntoIterator<Item = T>,
    {
        let (responses, result) = streams::single();
        let mut sink = self.client_streaming_with_sink(method, responses)?;
        for request in requests {
            sink.send(request);
        }
        sink.complete();
        self.wait(result).await
    }

    /// Start a bidirectional call. The returned sink takes the requests;
    /// responses arrive on `responses` as the service produces them.
    pub fn bidi_streaming_with_sink(&self, method: &str, responses: Sink) -> Result<Sink, ClientError> {
        let handle = self.method(method, CallShape::BidiStreaming)?;
        debug!(method = %handle.path(), shape = %handle.shape(), "Issuing call");
        Ok(self.channel.open(&handle, responses))
    }

    /// Send every request, then read the responses as an async stream.
    pub fn bidi_streaming<T, R, I>(&self, method: &str, requests: I) -> Result<ResponseStream<R>, ClientError>
    where
        T: Any + Send,
        R: Any + Send,
        I: IntoIterator<Item = T>,
    {
        let (responses, source) = sink::channel();
        let mut sink = self.bidi_streaming_with_sink(method, responses)?;
        for request in requests {
            sink.send(request);
        }
        sink.complete();
        Ok(ResponseStream::new(source))
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.info.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
