use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};
use warden_hub::{Config, Dispatcher, Error, Hub, MemoryGateway, SERVICE_NAME, console, logging};

/// Log consumer counts until shutdown is requested
async fn stats_task(hub: Arc<Hub>, interval_secs: u64, mut shutdown: mpsc::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    // First tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => logging::log_stats(&hub),
            _ = shutdown.recv() => break,
        }
    }
}

/// Main function to run the hub
async fn async_main() -> Result<(), Error> {
    let config = Config::load().await?;
    logging::init(&config)?;

    let gateway = MemoryGateway::load(&config.data_file).await?;
    let hub = Arc::new(Hub::new(config.outbox_capacity));
    let dispatcher = Dispatcher::new(Arc::clone(&hub), Arc::new(gateway.clone()));

    let (stats_tx, stats_rx) = mpsc::channel(1);
    let stats = (config.stats_interval_secs > 0).then(|| {
        tokio::spawn(stats_task(
            Arc::clone(&hub),
            config.stats_interval_secs,
            stats_rx,
        ))
    });

    let (stop_tx, mut stop_rx) = mpsc::channel(1);
    let console = tokio::spawn(console::run(dispatcher, stop_tx));

    info!(
        service = SERVICE_NAME,
        outbox_capacity = hub.outbox_capacity(),
        data_file = %config.data_file,
        "Hub started"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Ctrl+C received - initiating graceful shutdown");
        }
        // Closed stdin ends the console without stopping the hub
        Some(()) = stop_rx.recv() => {
            info!("Console stop received - initiating graceful shutdown");
        }
    }

    hub.close();
    let _ = stats_tx.send(()).await;
    if let Some(stats) = stats {
        let _ = stats.await;
    }
    console.abort();

    gateway.save(&config.data_file).await?;
    info!("Hub stopped");
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error building runtime: {err}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async_main());
    // The console may still be parked in a stdin read
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(err) = result {
        error!(error = %err, "Hub terminated with an error");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
