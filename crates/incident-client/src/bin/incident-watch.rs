//! Entry point for the incident-watch binary.

fn main() {
    std::process::exit(incident_client::watch::run_from_env());
}
