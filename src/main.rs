#[cfg(feature = "cli")]
#[tokio::main]
async fn main() {
    use clap::Parser;

    let args = kqlite::cli::Cli::parse();
    if let Err(e) = kqlite::run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("Error: built without the command line front end. Use --features cli");
    std::process::exit(1);
}
