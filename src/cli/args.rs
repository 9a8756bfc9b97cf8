use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "bflow", version, about = "Web bounty recon flow")]
pub struct Cli {
    /// Configuration file (default: ./flow.yaml, ./config/flow.yaml, user config dir)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Also show log output from libraries
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue, global = true)]
    pub verbose: bool,

    /// Debug logs
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the whole flow once in the foreground
    Run(RunArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Organization to add to the organizations list before running
    #[arg(long = "org")]
    pub organization: Option<String>,

    /// Alternate organizations list for this run
    #[arg(long = "org-list")]
    pub org_list: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long = "addr", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from(["bflow", "-d", "run", "--org", "Acme", "--org-list", "orgs.txt"]).unwrap();
        assert!(cli.debug);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.organization.as_deref(), Some("Acme"));
                assert_eq!(args.org_list.as_deref(), Some("orgs.txt"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn serve_defaults_to_port_8080() {
        let cli = Cli::try_parse_from(["bflow", "serve", "--config", "flow.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("flow.yaml")));
        match cli.command {
            Command::Serve(args) => assert_eq!(args.addr.port(), 8080),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn a_subcommand_is_required() {
        assert!(Cli::try_parse_from(["bflow"]).is_err());
    }
}
