fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer a system protoc when one is configured, otherwise use the vendored binary
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Well-known types (google/protobuf/timestamp.proto) ship with the vendored includes
    let well_known = protoc_bin_vendored::include_path()?;

    println!("cargo:rerun-if-changed=proto/telemetry.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/telemetry.proto"],
            &[std::path::PathBuf::from("proto"), well_known],
        )?;
    Ok(())
}
