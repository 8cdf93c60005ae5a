//! Stand-in for the car firmware: accepts one link at a time and answers signals

mod car;

use anyhow::{Context, Result};
use blueremote_shared::{codec, SPP_SERVICE_UUID};
use bluer::rfcomm::{Profile, Role};
use car::CarState;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "blueremote-peripheral-sim")]
struct Args {
    /// TCP address to listen on
    #[arg(long, default_value = "127.0.0.1:9000")]
    tcp: String,

    /// Serve the serial port profile over Bluetooth instead of TCP
    #[arg(long)]
    rfcomm: bool,

    /// RFCOMM channel to advertise (Bluetooth mode)
    #[arg(long)]
    channel: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    if args.rfcomm {
        serve_rfcomm(args.channel).await
    } else {
        serve_tcp(&args.tcp).await
    }
}

async fn serve_tcp(address: &str) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("Simulator listening on {}", address);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Remote connected from {}", peer);
        if let Err(e) = serve_link(socket).await {
            warn!("Link from {} failed: {:#}", peer, e);
        }
        info!("Remote {} disconnected", peer);
    }
}

async fn serve_rfcomm(channel: Option<u16>) -> Result<()> {
    let session = bluer::Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let profile = Profile {
        uuid: SPP_SERVICE_UUID,
        name: Some("BlueRemote car".to_string()),
        role: Some(Role::Server),
        channel,
        require_authentication: Some(false),
        require_authorization: Some(false),
        ..Default::default()
    };
    let mut requests = session.register_profile(profile).await?;
    info!("Serial port profile registered on {}", adapter.name());

    while let Some(request) = requests.next().await {
        let device = request.device();
        let stream = match request.accept() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to accept {}: {}", device, e);
                continue;
            }
        };

        info!("Remote {} connected", device);
        if let Err(e) = serve_link(stream).await {
            warn!("Link from {} failed: {:#}", device, e);
        }
        info!("Remote {} disconnected", device);
    }

    Ok(())
}

/// Answer every received signal until the remote hangs up
async fn serve_link<S>(mut stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut car = CarState::default();
    let mut buf = vec![0u8; codec::READ_BUFFER_SIZE];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let received = codec::decode_chunk(&buf[..n]);
        info!("Received {:?}", received);

        for signal in received.chars() {
            if let Some(reply) = car.apply(signal) {
                stream.write_all(&codec::encode_signal(&reply)).await?;
            }
        }
        stream.flush().await?;
    }
}
