use branchout::cli::PostActivityArgs;
use branchout::{
    log_error_chain, logging, BranchOutResult, PostActivityReport, PostActivityRunner, TaskStatus,
};
use clap::Parser;
use platform::LroPoller;
use std::process::ExitCode;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = PostActivityArgs::parse();
    let _guard = logging::init(args.api.log_format);

    match run(&args).await {
        Ok(report) => {
            for task in &report.tasks {
                match &task.status {
                    TaskStatus::Succeeded(summary) => info!(task = %task.task, %summary, "Succeeded"),
                    TaskStatus::Failed(cause) => warn!(task = %task.task, %cause, "Failed"),
                    TaskStatus::Skipped => info!(task = %task.task, "Skipped"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &PostActivityArgs) -> BranchOutResult<PostActivityReport> {
    let config = args.post_activity_config()?;
    let poller = LroPoller::new(args.api.poll_policy()?);

    let fabric = args.api.connect_fabric(&args.auth).await?;
    PostActivityRunner::new(&fabric, poller)
        .run(&config)
        .await?
        .into_result()
}
