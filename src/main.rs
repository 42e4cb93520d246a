use clap::Parser;
use std::sync::Arc;
use strigil::CrawlRequest;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        ::log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let builder = args.engine.builder()?;
    let bind = builder.config().bind.clone();
    ::log::info!(
        "Web crawling requires a WebDriver server (e.g., ChromeDriver) at {}",
        builder.config().webdriver_url
    );

    let engine = Arc::new(builder.build()?);

    let result = match args.command {
        Command::Crawl {
            start_url,
            instruction,
            depth,
        } => {
            let request = CrawlRequest::new(&start_url, &instruction, depth);
            let response = engine.run(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Serve { bind: override_bind } => {
            let bind = override_bind.unwrap_or(bind);
            strigil::server::serve(Arc::clone(&engine), &bind).await
        }
    };

    engine.shutdown().await;
    result
}
