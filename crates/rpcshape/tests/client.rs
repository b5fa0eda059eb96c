use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use pretty_assertions::assert_eq;
use rpcshape::client::{
    Channel, ClientConfig, ClientMethodHandle, LocalChannel, LocalChannelConfig, ServiceClient,
};
use rpcshape::marshal::{MarshallerRegistry, ProstMarshaller};
use rpcshape::sink::{SinkEvent, recording};
use rpcshape::{
    AnnotatedMethod, Annotation, CallShape, Class, ClientError, Instance, ModellerConfig,
    ServiceDescriptor, ServiceModel, ServiceModeller, ServiceRegistry, Signature, Sink, Type, Value,
};
use tokio::runtime::Handle;
use tracing_test::traced_test;

#[derive(Clone, PartialEq, prost::Message)]
struct Text {
    #[prost(string, tag = "1")]
    value: String,
}

fn text(value: &str) -> Text {
    Text {
        value: value.to_string(),
    }
}

fn words_model() -> ServiceModel<()> {
    let text_type = || Type::of::<Text>();
    ServiceModel::new(Class::named("demo.Words"), Instance::singleton(()))
        .method(
            AnnotatedMethod::new(
                "Shout",
                Signature::new().param(text_type()).returns(text_type()),
                |_, mut args| {
                    let request: Text = args.request()?;
                    Ok(Value::payload(text(&request.value.to_uppercase())))
                },
            )
            .annotate(Annotation::unary()),
        )
        .method(
            AnnotatedMethod::new(
                "Split",
                Signature::new()
                    .param(text_type())
                    .returns(Type::stream_of(text_type())),
                |_, mut args| {
                    let request: Text = args.request()?;
                    let words: Vec<Text> = request.value.split_whitespace().map(text).collect();
                    Ok(Value::iter(words))
                },
            )
            .annotate(Annotation::server_streaming()),
        )
        .method(
            AnnotatedMethod::new(
                "Join",
                Signature::new()
                    .param(Type::future_of(text_type()))
                    .returns(Type::sink_of(text_type())),
                |_, mut args| {
                    let mut promise = Some(args.promise()?);
                    let mut words = Vec::new();
                    Ok(Value::sink(Sink::from_fn(move |event| match event {
                        SinkEvent::Emit(value) => {
                            if let Ok(word) = value.take::<Text>() {
                                words.push(word.value);
                            }
                        }
                        SinkEvent::Complete => {
                            if let Some(promise) = promise.take() {
                                promise.complete(text(&words.join(" ")));
                            }
                        }
                        SinkEvent::Fail(status) => {
                            if let Some(promise) = promise.take() {
                                promise.fail(status);
                            }
                        }
                    })))
                },
            )
            .annotate(Annotation::client_streaming()),
        )
        .method(
            AnnotatedMethod::new(
                "Echo",
                Signature::new()
                    .param(Type::sink_of(text_type()))
                    .returns(Type::sink_of(text_type())),
                |_, mut args| Ok(Value::sink(args.sink()?)),
            )
            .annotate(Annotation::bidi_streaming()),
        )
}

fn modeller() -> ServiceModeller {
    let marshallers = MarshallerRegistry::new().with(ProstMarshaller::new().with::<Text>());
    ServiceModeller::new(ModellerConfig::new().with_marshallers(marshallers))
}

fn words() -> ServiceDescriptor {
    modeller().build(&words_model()).unwrap()
}

fn client_on(runtime: Handle, config: LocalChannelConfig) -> ServiceClient {
    let registry = Arc::new(ServiceRegistry::new());
    let info = registry.register(words()).unwrap().info();
    let channel = LocalChannel::new(registry, runtime).with_config(config);
    ServiceClient::new(info, Arc::new(channel), ClientConfig::default())
}

fn values(items: Vec<Result<Text, ClientError>>) -> Vec<String> {
    items.into_iter().map(|item| item.unwrap().value).collect()
}

#[traced_test]
#[tokio::test(flavor = "multi_thread")]
async fn test_async_calling_styles() {
    let client = client_on(Handle::current(), LocalChannelConfig::default());

    let shouted: Text = client.unary("Shout", text("hey")).await.unwrap();
    assert_eq!(shouted.value, "HEY");

    let split = client
        .server_streaming_stream::<_, Text>("Split", text("a b c"))
        .unwrap();
    assert_eq!(values(split.collect().await), vec!["a", "b", "c"]);

    let joined: Text = client
        .client_streaming("Join", [text("x"), text("y")])
        .await
        .unwrap();
    assert_eq!(joined.value, "x y");

    let echoed = client
        .bidi_streaming::<_, Text, _>("Echo", [text("1"), text("2")])
        .unwrap();
    assert_eq!(values(echoed.collect().await), vec!["1", "2"]);

    assert!(logs_contain("Opening call"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_calling_styles() {
    let client = client_on(Handle::current(), LocalChannelConfig::default());

    let (responses, recorder) = recording();
    client.unary_with_sink("Shout", text("quiet"), responses).unwrap();
    recorder.terminated().await;
    assert_eq!(recorder.kinds(), vec!["emit", "complete"]);
    assert_eq!(recorder.emitted::<Text>(), vec![text("QUIET")]);

    let (responses, recorder) = recording();
    client.server_streaming("Split", text("one two"), responses).unwrap();
    recorder.terminated().await;
    assert_eq!(recorder.emitted::<Text>(), vec![text("one"), text("two")]);
    assert!(recorder.is_completed());

    let (responses, recorder) = recording();
    let mut requests = client.client_streaming_with_sink("Join", responses).unwrap();
    requests.send(text("left"));
    requests.send(text("right"));
    requests.complete();
    recorder.terminated().await;
    assert_eq!(recorder.emitted::<Text>(), vec![text("left right")]);

    let (responses, recorder) = recording();
    let mut requests = client.bidi_streaming_with_sink("Echo", responses).unwrap();
    requests.send(text("ping"));
    assert_eq!(recorder.emitted::<Text>(), vec![text("ping")]);
    requests.complete();
    recorder.terminated().await;
    assert_eq!(recorder.kinds(), vec!["emit", "complete"]);
}

#[test]
fn test_blocking_calling_styles() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = client_on(runtime.handle().clone(), LocalChannelConfig::default());

    let shouted: Text = client.blocking_unary("Shout", text("loud")).unwrap();
    assert_eq!(shouted.value, "LOUD");

    let split: Vec<Text> = client
        .blocking_server_streaming("Split", text("p q"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(split, vec![text("p"), text("q")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_marshalled_channel_round_trips_payloads() {
    let client = client_on(Handle::current(), LocalChannelConfig::new().with_marshal(true));

    let shouted: Text = client.unary("Shout", text("wire")).await.unwrap();
    assert_eq!(shouted.value, "WIRE");

    let echoed = client
        .bidi_streaming::<_, Text, _>("Echo", [text("over"), text("the wire")])
        .unwrap();
    assert_eq!(values(echoed.collect().await), vec!["over", "the wire"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_marshalling_unregistered_type_fails_call() {
    let model = ServiceModel::new(Class::named("demo.Plain"), Instance::singleton(())).method(
        AnnotatedMethod::new(
            "Upper",
            Signature::new().param(Type::of::<String>()).returns(Type::of::<String>()),
            |_, mut args| Ok(Value::payload(args.request::<String>()?.to_uppercase())),
        )
        .annotate(Annotation::unary()),
    );
    let registry = Arc::new(ServiceRegistry::new());
    let info = registry.register(modeller().build(&model).unwrap()).unwrap().info();
    let channel = LocalChannel::new(registry, Handle::current())
        .with_config(LocalChannelConfig::new().with_marshal(true));
    let client = ServiceClient::new(info, Arc::new(channel), ClientConfig::default());

    let err = client.unary::<_, String>("Upper", "x".to_string()).await.unwrap_err();
    match err {
        ClientError::Status(status) => {
            assert_eq!(status.code(), tonic::Code::Internal);
            assert!(status.message().contains("no protobuf codec"), "{}", status.message());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_response_type_is_reported() {
    let client = client_on(Handle::current(), LocalChannelConfig::default());
    let err = client.unary::<_, String>("Shout", text("hey")).await.unwrap_err();
    assert!(matches!(err, ClientError::UnexpectedPayload { .. }), "{err}");
}

/// Counts calls that reach the channel.
#[derive(Default)]
struct CountingChannel {
    opened: AtomicUsize,
}

impl Channel for CountingChannel {
    fn open(&self, _method: &ClientMethodHandle, responses: Sink) -> Sink {
        self.opened.fetch_add(1, Ordering::SeqCst);
        drop(responses);
        Sink::closed()
    }
}

#[test]
fn test_lookup_failures_never_reach_the_channel() {
    let channel = Arc::new(CountingChannel::default());
    let client = ServiceClient::new(words().info(), channel.clone(), ClientConfig::default());

    let err = client.blocking_unary::<_, Text>("Split", text("a")).unwrap_err();
    match err {
        ClientError::ShapeMismatch {
            registered,
            requested,
            ..
        } => {
            assert_eq!(registered, CallShape::ServerStreaming);
            assert_eq!(requested, CallShape::Unary);
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = client.blocking_unary::<_, Text>("Missing", text("a")).unwrap_err();
    assert!(matches!(err, ClientError::UnknownMethod { ref method, .. } if method == "Missing"));

    let err = client
        .client_streaming_with_sink("Echo", Sink::closed())
        .unwrap_err();
    assert!(matches!(err, ClientError::ShapeMismatch { .. }));

    assert_eq!(channel.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_service_fails_in_channel() {
    let registry = Arc::new(ServiceRegistry::new());
    let channel = LocalChannel::new(registry, Handle::current());
    let client = ServiceClient::new(words().info(), Arc::new(channel), ClientConfig::default());

    let err = client.unary::<_, Text>("Shout", text("anyone?")).await.unwrap_err();
    match err {
        ClientError::Status(status) => assert_eq!(status.code(), tonic::Code::NotFound),
        other => panic!("unexpected error: {other}"),
    }
}
