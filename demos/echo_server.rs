use std::net::{TcpListener, TcpStream};
use std::thread;

use log::{info, warn};
use wirews::ws::{Config, Error, Websocket};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9001".to_owned());
    let listener = TcpListener::bind(&addr)?;
    info!("listening on {addr}");

    for stream in listener.incoming() {
        let stream = stream?;
        stream.set_nodelay(true)?;
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            match echo(stream) {
                Ok(()) | Err(Error::ReceivedCloseFrame(..)) => info!("{peer:?} disconnected"),
                Err(err) => warn!("{peer:?} failed: {err}"),
            }
        });
    }
    Ok(())
}

fn echo(stream: TcpStream) -> Result<(), Error> {
    let mut ws = Websocket::accept(stream, Config::server())?;
    info!("echoing on {}", ws.endpoint().unwrap_or("/"));
    loop {
        let (op_code, payload) = {
            let message = ws.read_message()?;
            (message.op_code, message.payload.to_vec())
        };
        ws.send(op_code, &payload)?;
    }
}
