//! `onboard server` — Start the onboarding HTTP backend server.

pub async fn run(
    host: String,
    port: u16,
    db_path: String,
    definition_path: Option<String>,
) -> Result<(), String> {
    let config = onboard_server::ServerConfig {
        host: host.clone(),
        port,
        db_path,
        definition_path,
    };

    println!("Starting onboarding server on {}:{}...", host, port);

    let addr = onboard_server::start_server(config).await?;
    println!("Onboarding server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
