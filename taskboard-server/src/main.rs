#[tokio::main]
async fn main() {
    if let Err(e) = taskboard_server::run().await {
        eprintln!("taskboard-server: {}", e);
        std::process::exit(1);
    }
}
