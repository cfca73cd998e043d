use branchout::cli::BranchOutArgs;
use branchout::{log_error_chain, logging, BranchOutError, BranchOutResult, ProvisionOutcome, Provisioner};
use clap::Parser;
use platform::{GitHubClient, LroPoller};
use std::process::ExitCode;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = BranchOutArgs::parse();
    let _guard = logging::init(args.api.log_format);

    match run(&args).await {
        Ok(outcome) => {
            info!(
                branch = %outcome.branch.name,
                branch_created = outcome.branch_created,
                workspace_id = %outcome.workspace.id,
                workspace_created = outcome.workspace_created,
                synced_from_git = outcome.synced_from_git,
                "Branch-out finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &BranchOutArgs) -> BranchOutResult<ProvisionOutcome> {
    let config = args.provision_config();
    config.validate().map_err(BranchOutError::config)?;
    let poller = LroPoller::new(args.api.poll_policy()?);

    let fabric = args.api.connect_fabric(&args.auth).await?;
    let github = GitHubClient::new(args.github_config(), args.gh_pat_token.as_str())?;

    Provisioner::new(&fabric, &github, poller).run(&config).await
}
