//! Messages exchanged by the sample services.

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct StringMessage {
    #[prost(string, tag = "1")]
    pub text: String,
}

impl StringMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetRequest {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetResponse {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SetGreetingRequest {
    #[prost(string, tag = "1")]
    pub greeting: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SetGreetingResponse {
    #[prost(string, tag = "1")]
    pub greeting: String,
}
