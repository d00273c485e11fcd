/// Recommended error type for code driving the runner. Errors returned with this type are fatal
/// to the execution; recoverable problems such as unhealthy runs are handled inside the runner.
pub type ProvingGroundResult<T> = anyhow::Result<T>;
