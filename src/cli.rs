use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ci-status-server", about = "CI telemetry and statistics server")]
pub struct Args {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP listener on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Print the OpenAPI document as JSON and exit.
    #[arg(long, default_value_t = false)]
    pub print_openapi: bool,
}
