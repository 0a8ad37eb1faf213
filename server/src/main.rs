use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::ServerArgs;
use server::network::Server;

/// Parses command-line arguments, starts the game loop and waits for Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = ServerArgs::parse();
    let config = args.game_config()?;

    info!("Starting star arena server...");
    info!(
        "Round length {:?}, field {}x{}, tick rate {} Hz",
        config.round_duration, config.field_width, config.field_height, config.tick_rate
    );

    let server = Server::new(&args.bind_address(), config).await?;
    let handle = server.handle();
    let mut game_loop = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut game_loop => {
            match result {
                Ok(Ok(())) => info!("Game loop stopped"),
                Ok(Err(e)) => error!("Game loop failed: {}", e),
                Err(e) => error!("Game loop task panicked: {}", e),
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    handle.shutdown();
    game_loop.await??;

    Ok(())
}
