use std::{io, process::ExitCode};

use t2t::{
    config::T2tConfig,
    fifo::{remove_fifo, FifoSource},
};
use t2t_core::{daemon::Daemon, dispatch::StreamDispatcher, ActuatorBuilder};
use t2t_devices::devices::pca9685::Pca9685DeviceBuilder;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    //stdout carries the byte stream, so diagnostics go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "t2t=info,t2t_core=info,t2t_devices=info,t2t_rpi=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 {
        warn!("at most one parameter, the config file, is expected.");
        warn!("got {}", args.join(","));
        return ExitCode::FAILURE;
    }

    let config = match T2tConfig::load(args.get(1).map(|o| o.as_str())) {
        Ok(config) => config,
        Err(err) => {
            error!("Error starting text2type. {}", err);
            return ExitCode::FAILURE;
        }
    };

    info!("text2type starting up!");
    if let Some(ref name) = config.metadata.name {
        info!("name: {name}")
    }
    if let Some(ref descrip) = config.metadata.description {
        info!("description: {descrip}")
    }

    match start(config).await {
        Ok(()) => {
            info!("text2type shut down!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("text2type exited with an error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn start(config: T2tConfig) -> Result<(), Box<dyn std::error::Error>> {
    let actuator =
        Pca9685DeviceBuilder::new(t2t_rpi::open_bus, t2t_rpi::delay).try_build(&config.actuator)?;
    let source = FifoSource::open(&config.fifo).await?;
    let fifo_path = source.path().to_path_buf();

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone())?;

    let mut daemon = Daemon::new(source, StreamDispatcher::new(tokio::io::stdout()), actuator)
        .with_reopen_after(config.fifo.reopen_after);
    let result = daemon.run(&cancel).await;
    info!("forwarded {} bytes", daemon.dispatcher().forwarded());

    if config.fifo.remove_on_exit {
        if let Err(err) = remove_fifo(&fifo_path).await {
            warn!("failed to remove fifo {}: {}", fifo_path.display(), err);
        }
    }

    result?;
    Ok(())
}

fn cancel_on_signal(cancel: CancellationToken) -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}
