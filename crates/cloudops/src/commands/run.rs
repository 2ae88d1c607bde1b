//! cloudops <provider> <group> <method> handler

use cloudops_core::{CommandRegistry, ExecutionResult, ProviderGateway};

/// Run one verb and print its JSON result on stdout.
///
/// Returns the process exit code. Fatal errors (unimplemented phases,
/// broken command specs) come back as `Err`.
pub async fn handle_run(
    registry: &CommandRegistry,
    gateway: &dyn ProviderGateway,
    verb: &str,
    args: &[String],
) -> anyhow::Result<i32> {
    tracing::info!("{} {}", gateway.name(), verb);
    let result = registry.invoke(gateway, verb, args).await?;
    print_result(&result)?;
    Ok(result.exit_code())
}

fn print_result(result: &ExecutionResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&result.to_json())?);
    Ok(())
}
