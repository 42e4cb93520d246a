use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use strigil::Strigil;

#[derive(Parser, Debug)]
#[command(name = "strigil")]
#[command(about = "Instruction-guided crawler that explores a site the way an LLM planner directs")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single crawl and print the response as JSON
    Crawl {
        /// URL to start crawling from
        start_url: String,

        /// What to look for on the site
        #[arg(short, long)]
        instruction: String,

        /// Maximum depth below the start page (0-6)
        #[arg(short, long, default_value_t = 2, allow_negative_numbers = true)]
        depth: i64,
    },

    /// Serve crawl requests over HTTP
    Serve {
        /// Address to bind the HTTP server to (host:port)
        #[arg(long, env = "STRIGIL_BIND")]
        bind: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct EngineArgs {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of pages processed concurrently
    #[arg(short, long, global = true)]
    pub concurrency: Option<usize>,

    /// Maximum number of pages per crawl
    #[arg(long, global = true)]
    pub max_nodes: Option<usize>,

    /// Total timeout in seconds for one crawl
    #[arg(long, global = true)]
    pub total_timeout: Option<u64>,
}

impl EngineArgs {
    /// Layer command-line overrides over the configuration file and environment
    pub fn builder(&self) -> Result<Strigil, Box<dyn std::error::Error>> {
        let mut builder = match &self.config {
            Some(path) => Strigil::new().with_config_file(path)?,
            None => Strigil::new(),
        };
        builder = builder.with_env();

        if let Some(concurrency) = self.concurrency {
            builder = builder.with_max_concurrency(concurrency);
        }
        if let Some(max_nodes) = self.max_nodes {
            builder = builder.with_max_nodes(max_nodes);
        }
        if let Some(total_timeout) = self.total_timeout {
            builder = builder.with_total_timeout(total_timeout);
        }
        Ok(builder)
    }
}
