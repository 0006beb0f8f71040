mod args;
mod dispatch;
mod http_remote;

#[tokio::main]
async fn main() {
    if let Err(err) = dispatch::run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
