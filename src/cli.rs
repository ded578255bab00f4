use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubails")]
#[command(version)]
#[command(
    about = "Develop and deploy Kubernetes native applications on Google Cloud Platform",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project document to use instead of searching for kubails.json
    #[arg(long, env = "KUBAILS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Narrow the default service set to what changed.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only act on services whose folder changed since --since
    #[arg(long, global = true)]
    pub only_changed_services: bool,

    /// Revision to compare against for --only-changed-services
    #[arg(long, global = true, default_value = "master")]
    pub since: String,

    /// Use every service when this branch is production or has no namespace yet
    #[arg(long, global = true, value_name = "BRANCH")]
    pub all_services_branch: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read and edit the project configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage the cloud infrastructure
    #[command(subcommand)]
    Infra(InfraCommand),

    /// Manage the Kubernetes cluster
    #[command(subcommand)]
    Cluster(ClusterCommand),

    /// Build, test and run services
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Send deployment notifications
    #[command(subcommand)]
    Notify(NotifyCommand),

    /// Check that every required tool is installed
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the project configuration
    List {
        /// Print the variables handed to Terraform instead
        #[arg(long)]
        flattened: bool,

        /// Layout of the flattened variables
        #[arg(long, value_enum, default_value_t = VarLayout::Flat)]
        var_layout: VarLayout,
    },

    /// Print one value by its dotted path
    Get {
        /// Path such as __services.web.replicas
        key: String,
    },

    /// Set one value by its dotted path
    Set {
        /// Path such as __services.web.replicas
        key: String,

        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
}

/// How the project document is turned into Terraform variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum VarLayout {
    /// One variable per leaf value
    #[default]
    Flat,
    /// One variable per top-level key, nested keys joined with `__`
    Grouped,
}

// ============================================================================
// Infra Commands
// ============================================================================

#[derive(Subcommand)]
pub enum InfraCommand {
    /// Enable APIs, create the service account and the Terraform state bucket
    Setup(VarsArgs),

    /// Remove the service account and the Terraform state bucket
    Cleanup,

    /// Create a service account key for this machine
    Authenticate(VarsArgs),

    /// Delete this machine's service account key
    Unauthenticate,

    /// Apply the infrastructure and deploy the cluster add-ons
    Deploy(VarsArgs),

    /// Destroy the infrastructure (KMS keys are kept)
    Destroy(VarsArgs),

    /// Run an arbitrary Terraform command in the project
    Terraform {
        /// Terraform subcommand
        subcommand: String,

        /// Arguments passed through to Terraform
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Pass the project variables to Terraform
        #[arg(long)]
        with_vars: bool,

        #[command(flatten)]
        vars: VarsArgs,
    },
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct VarsArgs {
    /// Layout of the Terraform variables
    #[arg(long, value_enum, default_value_t = VarLayout::Flat)]
    pub var_layout: VarLayout,
}

// ============================================================================
// Cluster Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ClusterCommand {
    /// Fetch credentials for the project cluster
    Authenticate,

    /// Delete the ingress and destroy the cluster
    Destroy,

    /// Delete namespaces whose branch no longer exists
    CleanupNamespaces,

    /// Exit successfully only when the branch has no namespace yet
    IsNewNamespace {
        /// Branch or namespace name
        namespace: String,
    },

    /// Generate and deploy manifests
    #[command(subcommand)]
    Manifests(ManifestsCommand),

    /// Encrypt and deploy service secrets
    #[command(subcommand)]
    Secrets(SecretsCommand),
}

#[derive(Subcommand)]
pub enum ManifestsCommand {
    /// Render the Helm templates of each service
    Generate {
        /// Services to render; defaults to every service
        services: Vec<String>,

        #[arg(long, default_value = "default")]
        namespace: String,

        #[arg(long, default_value = "latest")]
        tag: String,
    },

    /// Apply the generated manifests
    Deploy {
        /// Services to deploy; defaults to every service
        services: Vec<String>,

        #[arg(long, default_value = "default")]
        namespace: String,
    },
}

#[derive(Subcommand)]
pub enum SecretsCommand {
    /// Decrypt each service's secrets and create them in the namespace
    Deploy {
        /// Services to deploy; defaults to every service with secrets
        services: Vec<String>,

        #[arg(long, default_value = "default")]
        namespace: String,
    },

    /// Encrypt an env file and register it as a service's secrets
    Create {
        /// Plaintext env file (KEY=value per line)
        file: PathBuf,

        /// Service owning the secret; defaults to the service folder you are in
        #[arg(long)]
        service: Option<String>,

        /// Name of the Kubernetes secret; defaults to `<current folder>-secrets`
        #[arg(long)]
        secret_name: Option<String>,
    },
}

// ============================================================================
// Service Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Start services locally with docker-compose
    Start {
        services: Vec<String>,
    },

    /// Stop local services and remove their volumes
    Destroy,

    /// Run each service's lint target
    Lint(MakeArgs),

    /// Run each service's test target
    Test(MakeArgs),

    /// Run each service's ci target
    Ci(MakeArgs),

    /// Run an arbitrary make target in each service
    Make {
        /// Make target
        target: String,

        #[command(flatten)]
        args: MakeArgs,
    },

    /// Build and push service images
    #[command(subcommand)]
    Images(ImagesCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct MakeArgs {
    /// Services to run in; defaults to every service with code
    pub services: Vec<String>,

    /// Image tag to use as build cache
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Subcommand)]
pub enum ImagesCommand {
    /// Build images, reusing remote layers as cache
    Build(ImagesArgs),

    /// Push the tags produced by build
    Push(ImagesArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImagesArgs {
    /// Services to build; defaults to every service with code
    pub services: Vec<String>,

    /// Branch being built; empty for a local build
    #[arg(long, default_value = "")]
    pub branch: String,

    /// Commit being built; empty for a local build
    #[arg(long, default_value = "")]
    pub commit: String,
}

// ============================================================================
// Notify Commands
// ============================================================================

#[derive(Subcommand)]
pub enum NotifyCommand {
    /// Post to a Slack incoming webhook
    #[command(subcommand)]
    Slack(SlackCommand),
}

#[derive(Subcommand)]
pub enum SlackCommand {
    /// Announce a successful deployment
    Success {
        /// Incoming webhook URL
        webhook: String,

        /// Namespace that was deployed
        #[arg(long)]
        namespace: String,

        /// Commit that was deployed
        #[arg(long)]
        commit: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_selection() {
        let cli = Cli::try_parse_from([
            "kubails",
            "--only-changed-services",
            "--all-services-branch",
            "feature/x",
            "service",
            "lint",
            "web",
        ])
        .unwrap();

        assert!(cli.selection.only_changed_services);
        assert_eq!(cli.selection.since, "master");
        assert_eq!(cli.selection.all_services_branch.as_deref(), Some("feature/x"));
        match cli.command {
            Command::Service(ServiceCommand::Lint(args)) => {
                assert_eq!(args.services, vec!["web"]);
                assert_eq!(args.tag, None);
            }
            _ => panic!("expected service lint"),
        }
    }

    #[test]
    fn test_parse_terraform_passthrough() {
        let cli = Cli::try_parse_from([
            "kubails", "infra", "terraform", "plan", "--with-vars", "-out", "plan.tfplan",
        ])
        .unwrap();

        match cli.command {
            Command::Infra(InfraCommand::Terraform {
                subcommand,
                args,
                with_vars,
                ..
            }) => {
                assert_eq!(subcommand, "plan");
                assert!(with_vars);
                assert_eq!(args, vec!["-out", "plan.tfplan"]);
            }
            _ => panic!("expected infra terraform"),
        }
    }

    #[test]
    fn test_parse_config_list_layout() {
        let cli = Cli::try_parse_from([
            "kubails", "config", "list", "--flattened", "--var-layout", "grouped",
        ])
        .unwrap();

        match cli.command {
            Command::Config(ConfigCommand::List {
                flattened,
                var_layout,
            }) => {
                assert!(flattened);
                assert_eq!(var_layout, VarLayout::Grouped);
            }
            _ => panic!("expected config list"),
        }
    }
}
