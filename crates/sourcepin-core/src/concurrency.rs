use sourcepin_resolve::CancelToken;

/// Route Ctrl-C into `token`. The first signal cancels the run so in-flight
/// resolutions wind down; a second one exits immediately.
pub fn install_signal_handler(token: CancelToken) {
    let _ = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!("\ncancelling, waiting for in-flight requests to stop...");
    });
}
