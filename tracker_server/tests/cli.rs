use clap::Parser;
use tracker_server::cli::{Cli, Commands};

// Lives in its own test binary: it mutates the process environment.
#[test]
fn bare_invocation_reads_listen_settings_from_env() {
    // SAFETY: the only test in this binary, so no other thread reads the env.
    unsafe {
        std::env::set_var("PORT", "8080");
        std::env::set_var("HOST", "127.0.0.1");
        std::env::set_var("TRACKER_DATA_DIR", "/tmp/kt-cli");
    }

    let cmd = Cli::try_parse_from(["tracker"])
        .unwrap()
        .into_command()
        .unwrap();
    match cmd {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(port, 8080);
            assert_eq!(data_dir, std::path::PathBuf::from("/tmp/kt-cli"));
        }
        other => panic!("expected serve, got {other:?}"),
    }
}
