use std::net::TcpStream;

use log::info;
use url::Url;
use wirews::ws::{Config, Websocket};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:9001/echo".to_owned());
    let addr = Url::parse(&url)?
        .socket_addrs(|| Some(80))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("unable to resolve {url}"))?;

    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    let mut ws = Websocket::connect(stream, &url, Config::client().with_fragment_size(16))?;

    ws.send_ping(b"are you there")?;
    for text in ["hello", "a message long enough to be sent in several fragments"] {
        ws.send_text(text)?;
        let message = ws.read_message_with(|op_code, payload, _| {
            info!("received {op_code}: {}", String::from_utf8_lossy(payload));
            Ok(())
        })?;
        println!("echo: {}", message.as_text()?);
    }

    ws.close(&1000u16.to_be_bytes())?;
    Ok(())
}
