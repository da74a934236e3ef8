fn main() {
    if let Err(err) = pi_agent::cli::run_pi_agent() {
        tracing::error!(error = %err, "pi-agent failed");
        std::process::exit(1);
    }
}
