use std::ffi::OsString;

use clap::{error::ErrorKind, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

use crate::{metadata::Client, Result};

/// Styles for CLI
fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightCyan))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Option<Commands>,

  /// Metadata service host (hostname or IP)
  ///
  /// Defaults to 169.254.169.254 when unset or empty
  #[arg(long, env = "GCE_METADATA_HOST", global = true)]
  pub host: Option<String>,

  #[clap(flatten)]
  pub verbose: Verbosity,
}

impl Cli {
  /// Parse the command line, returning `None` when usage help should be shown instead
  ///
  /// Requests for help or version are printed and exit immediately. Any other
  /// parse failure (extra arguments, unknown subcommand) is treated like a
  /// missing subcommand rather than a usage error.
  pub fn parse_permissive<I, T>(args: I) -> Option<Self>
  where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
  {
    match Self::try_parse_from(args) {
      Ok(cli) => Some(cli),
      Err(err) => match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => None,
      },
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Subcommand)]
pub enum Commands {
  /// The project ID
  ProjectId,

  /// The numeric project ID of the instance
  ///
  /// This is not the same as the project name visible in the Google Cloud console
  NumericProjectId,

  /// The free-text description of the instance, assigned using the --description flag or set in the API
  Desc,

  /// The full host name of the instance
  Hostname,

  /// The short host name of the instance
  InstanceName,

  /// The unique, numerical ID of the instance generated by Compute Engine
  InstanceId,

  /// The machine type of the instance
  MachineType,

  /// The zone of the instance
  Zone,

  /// The primary internal IP address of the instance
  InternalIp,

  /// The primary external IP address of the instance
  ExternalIp,

  /// The network tags of the instance, one per line
  Tags,

  /// The names of user-defined instance attributes, one per line
  Attributes,

  /// Whether this process is running on Compute Engine
  OnGce,
}

impl Commands {
  /// Query the metadata service, returning the lines to print
  pub async fn run(&self, client: &Client) -> Result<Vec<String>> {
    let lines = match self {
      Commands::ProjectId => vec![client.project_id().await?],
      Commands::NumericProjectId => vec![client.numeric_project_id().await?],
      Commands::Desc => vec![client.description().await?],
      Commands::Hostname => vec![client.hostname().await?],
      Commands::InstanceName => vec![client.instance_name().await?],
      Commands::InstanceId => vec![client.instance_id().await?],
      Commands::MachineType => vec![client.machine_type().await?],
      Commands::Zone => vec![client.zone().await?],
      Commands::InternalIp => vec![client.internal_ip().await?],
      Commands::ExternalIp => vec![client.external_ip().await?],
      Commands::Tags => client.instance_tags().await?,
      Commands::Attributes => client.instance_attributes().await?,
      Commands::OnGce => vec![client.probe_presence().await.to_string()],
    };

    Ok(lines)
  }
}

#[cfg(test)]
mod tests {
  use std::process::Command;

  use assert_cmd::prelude::*;
  use httptest::{matchers::*, responders::*, Expectation, Server};
  use predicates::str::contains as output_contains;
  use rstest::*;

  use super::*;

  fn gcemeta_cmd() -> Command {
    let bin_under_test = escargot::CargoBuild::new()
      .bin("gcemeta")
      .current_release()
      .current_target()
      .run()
      .unwrap();

    let mut cmd = bin_under_test.command();
    cmd.env_remove("GCE_METADATA_HOST");
    cmd
  }

  #[rstest]
  #[case(&["gcemeta"])]
  #[case(&["gcemeta", "zone", "extra"])]
  #[case(&["gcemeta", "zone", "extra", "more"])]
  #[case(&["gcemeta", "not-a-command"])]
  fn it_shows_help_for_malformed_invocations(#[case] args: &[&str]) {
    let cli = Cli::parse_permissive(args);
    assert!(cli.map_or(true, |c| c.command.is_none()));
  }

  #[rstest]
  #[case("project-id", Commands::ProjectId)]
  #[case("numeric-project-id", Commands::NumericProjectId)]
  #[case("desc", Commands::Desc)]
  #[case("hostname", Commands::Hostname)]
  #[case("instance-name", Commands::InstanceName)]
  #[case("instance-id", Commands::InstanceId)]
  #[case("machine-type", Commands::MachineType)]
  #[case("zone", Commands::Zone)]
  #[case("internal-ip", Commands::InternalIp)]
  #[case("external-ip", Commands::ExternalIp)]
  #[case("tags", Commands::Tags)]
  #[case("attributes", Commands::Attributes)]
  #[case("on-gce", Commands::OnGce)]
  fn it_parses_subcommands(#[case] name: &str, #[case] expected: Commands) {
    let cli = Cli::parse_permissive(["gcemeta", name]).unwrap();
    assert_eq!(cli.command, Some(expected));
  }

  #[test]
  fn it_parses_host_after_subcommand() {
    let cli = Cli::parse_permissive(["gcemeta", "zone", "--host", "10.0.0.9"]).unwrap();
    assert_eq!(cli.host.as_deref(), Some("10.0.0.9"));
  }

  #[rstest]
  #[case("project-id", "project/project-id", "my-project\n", "my-project\n")]
  #[case("numeric-project-id", "project/numeric-project-id", "123456789012", "123456789012\n")]
  #[case("desc", "instance/description", "  build agent  ", "build agent\n")]
  #[case("hostname", "instance/hostname", "abc123.c.myproj.internal", "abc123.c.myproj.internal\n")]
  #[case("instance-name", "instance/hostname", "abc123.c.myproj.internal", "abc123\n")]
  #[case("instance-id", "instance/id", "4520031799277581759", "4520031799277581759\n")]
  #[case(
    "machine-type",
    "instance/machine-type",
    "projects/123456/machineTypes/n1-standard-1",
    "n1-standard-1\n"
  )]
  #[case("zone", "instance/zone", "projects/123456/zones/us-central1-b", "us-central1-b\n")]
  #[case("internal-ip", "instance/network-interfaces/0/ip", "10.128.0.2", "10.128.0.2\n")]
  #[case("tags", "instance/tags", r#"["tag-a","tag-b"]"#, "tag-a\ntag-b\n")]
  #[case("attributes", "instance/attributes/", "ssh-keys\nstartup-script\n", "ssh-keys\nstartup-script\n")]
  fn it_prints_values(
    #[case] subcommand: &str,
    #[case] path: &str,
    #[case] body: &'static str,
    #[case] expected: &'static str,
  ) {
    let server = Server::run();
    server.expect(
      Expectation::matching(request::method_path("GET", format!("/computeMetadata/v1/{path}")))
        .respond_with(status_code(200).body(body)),
    );

    gcemeta_cmd()
      .env("GCE_METADATA_HOST", server.addr().to_string())
      .arg(subcommand)
      .assert()
      .success()
      .stdout(expected);
  }

  #[test]
  fn it_uses_host_flag() {
    let server = Server::run();
    server.expect(
      Expectation::matching(request::method_path("GET", "/computeMetadata/v1/instance/zone"))
        .respond_with(status_code(200).body("projects/1/zones/europe-west1-d")),
    );

    gcemeta_cmd()
      .arg("zone")
      .arg("--host")
      .arg(server.addr().to_string())
      .assert()
      .success()
      .stdout("europe-west1-d\n");
  }

  #[test]
  fn it_fails_when_not_defined() {
    let server = Server::run();
    server.expect(
      Expectation::matching(request::method_path("GET", "/computeMetadata/v1/instance/description"))
        .respond_with(status_code(404)),
    );

    gcemeta_cmd()
      .env("GCE_METADATA_HOST", server.addr().to_string())
      .arg("desc")
      .assert()
      .failure()
      .stderr(output_contains("\"instance/description\" not defined"));
  }

  #[test]
  fn it_fails_on_unexpected_status() {
    let server = Server::run();
    server.expect(
      Expectation::matching(request::method_path("GET", "/computeMetadata/v1/project/project-id"))
        .respond_with(status_code(500)),
    );

    gcemeta_cmd()
      .env("GCE_METADATA_HOST", server.addr().to_string())
      .arg("project-id")
      .assert()
      .failure()
      .stderr(output_contains("status code 500"));
  }

  #[rstest]
  #[case(&[])]
  #[case(&["zone", "extra"])]
  #[case(&["zone", "extra", "more"])]
  fn it_prints_help_and_succeeds(#[case] args: &[&str]) {
    gcemeta_cmd()
      .args(args)
      .assert()
      .success()
      .stdout(output_contains("Usage"));
  }
}
