use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use rpcshape::client::{ClientConfig, LocalChannel, LocalChannelConfig, ServiceClient};
use rpcshape::{ModellerConfig, ServiceRegistry};
use rpcshape_services::proto::{GreetRequest, GreetResponse, StringMessage};
use rpcshape_services::{greet, register_services};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let text = std::env::var("TEXT").unwrap_or_else(|_| "A quick brown fox".to_string());
    let marshal = std::env::var("MARSHAL").is_ok_and(|value| value == "1" || value == "true");

    let registry = Arc::new(ServiceRegistry::new());
    let modeller = rpcshape_services::modeller(ModellerConfig::new().with_strict_types(true));
    register_services(&registry, &modeller)?;
    println!("Registered services: {}", registry.services().join(", "));

    let channel = Arc::new(
        LocalChannel::new(Arc::clone(&registry), Handle::current())
            .with_config(LocalChannelConfig::new().with_marshal(marshal)),
    );

    let greeter = registry
        .get(greet::SERVICE_NAME)
        .context("greet service not registered")?;
    let greeter = ServiceClient::new(greeter.info(), channel.clone(), ClientConfig::default());
    let reply: GreetResponse = greeter
        .unary("Greet", GreetRequest { name: None })
        .await?;
    println!("Greet: {}", reply.message);

    let strings = registry
        .get("StringService")
        .context("string service not registered")?;
    let client = ServiceClient::new(strings.info(), channel, ClientConfig::default());

    let upper: StringMessage = client.unary("Upper", StringMessage::new(&text)).await?;
    println!("Upper: {}", upper.text);

    let lower: StringMessage = client.unary("Lower", StringMessage::new(&text)).await?;
    println!("Lower: {}", lower.text);

    let mut split = client.server_streaming_stream::<_, StringMessage>("Split", StringMessage::new(&text))?;
    while let Some(part) = split.next().await {
        println!("Split: {}", part?.text);
    }

    let words: Vec<StringMessage> = text.split_whitespace().map(StringMessage::new).collect();
    let joined: StringMessage = client.client_streaming("Join", words.clone()).await?;
    println!("Join: {}", joined.text);

    let mut echoed = client.bidi_streaming::<_, StringMessage, _>("Echo", words)?;
    while let Some(echo) = echoed.next().await {
        println!("Echo: {}", echo?.text);
    }

    Ok(())
}
