use clap::Parser;
use hypofin::api::{Cli, Command, run_http_server, run_simulation};

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            if let Err(e) = run_http_server(args).await {
                log::error!("server error: {e}");
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Simulate(args) => match run_simulation(args) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(2);
            }
        },
    }
}
