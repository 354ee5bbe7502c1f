use flowgate::cli::run_cli;

#[tokio::main]
async fn main() {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    if let Err(e) = run_cli().await {
        tracing::error!(error = %e, "Flowgate exited with error");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
