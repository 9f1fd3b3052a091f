//! Command-line client for the gateway.
//!
//! Usage: ai-gateway-client [--url URL] [--system TEXT] [--image PATH] [--stream] PROMPT...
//!
//! The API key is read from `GATEWAY_API_KEY`, the URL defaults to `GATEWAY_URL`.

use std::env;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use gateway_common::{Envelope, GenerateRequest};
use serde_json::Value;

const SAVED_IMAGE: &str = "ai_output.jpg";

#[derive(Debug, Default)]
struct Args {
    url: Option<String>,
    system: Option<String>,
    image: Option<String>,
    stream: bool,
    prompt: Vec<String>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    while let Some(arg) = raw.next() {
        let mut value = |flag: &str| raw.next().ok_or_else(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--url" => args.url = Some(value("--url")?),
            "--system" => args.system = Some(value("--system")?),
            "--image" => args.image = Some(value("--image")?),
            "--stream" => args.stream = true,
            other => args.prompt.push(other.to_string()),
        }
    }
    if args.prompt.is_empty() {
        return Err("a prompt is required".to_string());
    }
    Ok(args)
}

/// Split `data:image/...;base64,<payload>` and decode the payload.
fn decode_image_response(response: &str) -> Option<Vec<u8>> {
    if !response.contains("data:image") {
        return None;
    }
    let (_, encoded) = response.split_once(',')?;
    STANDARD.decode(encoded.trim()).ok()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(env::args().skip(1))?;
    let url = args
        .url
        .or_else(|| env::var("GATEWAY_URL").ok())
        .ok_or("set GATEWAY_URL or pass --url")?;
    let api_key = env::var("GATEWAY_API_KEY").unwrap_or_default();

    let mut body = GenerateRequest::new(args.prompt.join(" "));
    body.system_prompt = args.system;
    body.stream = args.stream;
    if let Some(path) = args.image {
        let bytes = tokio::fs::read(&path).await?;
        body.image = Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)));
    }

    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        match response.json::<Envelope>().await {
            Ok(Envelope::Failure(failure)) => eprintln!(
                "Error: {} - {}",
                failure.error,
                failure.details.unwrap_or_default()
            ),
            _ => eprintln!("HTTP Error: {}", status),
        }
        std::process::exit(1);
    }

    if body.stream {
        println!("Streaming output:");
        let mut pending = String::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            pending.push_str(&String::from_utf8_lossy(&chunk?));
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                let line = line.trim_end();
                if !line.is_empty() {
                    println!("{}", line);
                }
            }
        }
        if !pending.trim().is_empty() {
            println!("{}", pending.trim_end());
        }
        return Ok(());
    }

    let envelope: Envelope = response.json().await?;
    let Envelope::Success(success) = envelope else {
        return Err("gateway returned a failure envelope with a success status".into());
    };

    match &success.response {
        Value::String(text) => {
            println!("AI Response: {}", text);
            if let Some(bytes) = decode_image_response(text) {
                tokio::fs::write(SAVED_IMAGE, bytes).await?;
                println!("Image saved as {}", SAVED_IMAGE);
            }
        }
        other => println!("AI Response: {}", other),
    }

    Ok(())
}
