use std::sync::OnceLock;

/// Select the process-wide rustls crypto provider before the first `wss://` handshake.
///
/// rustls 0.23 panics when more than one provider feature is compiled in and none is
/// installed. Another component may already have installed one; that is fine.
pub fn install_rustls_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
