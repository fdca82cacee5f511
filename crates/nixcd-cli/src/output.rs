use nixcd_core::DeploymentResult;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_result(result: &DeploymentResult) {
    let outcome = if result.succeeded() { "succeeded" } else { "failed" };
    println!(
        "{} {} ({:?}) {}",
        result.hostname, result.operation, result.mode, outcome
    );
    if let Some(out) = &result.output_path {
        println!("  output path:   {}", out.display());
    }
    println!("  needs restart: {}", result.needs_restart);
    if let Some(failure) = &result.error {
        println!("  failed during: {:?}", failure.phase);
        println!("  error:         {}", failure.message);
    }
    let elapsed = result.finished_at - result.started_at;
    println!("  duration:      {}s", elapsed.num_seconds());
}
