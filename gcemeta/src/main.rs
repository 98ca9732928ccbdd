use std::process;

use anyhow::Result;
use clap::CommandFactory;
use gcemeta::{Cli, Client, Config};
use tracing_log::AsTrace;
use tracing_subscriber::FmtSubscriber;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> Result<()> {
  // Missing or malformed subcommands show usage and exit successfully
  let Some(Cli {
    command: Some(command),
    host,
    verbose,
  }) = Cli::parse_permissive(std::env::args_os())
  else {
    Cli::command().print_help()?;
    return Ok(());
  };

  let subscriber = FmtSubscriber::builder()
    .with_max_level(verbose.log_level_filter().as_trace())
    .with_writer(std::io::stderr)
    .without_time()
    .finish();
  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");

  let client = Client::new(Config::new(host));
  match command.run(&client).await {
    Ok(lines) => {
      for line in lines {
        println!("{line}");
      }
      Ok(())
    }
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}
