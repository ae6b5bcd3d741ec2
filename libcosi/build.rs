fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Vendored protoc, so no system install is needed to build the COSI bindings.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()?;
    // SAFETY: build scripts are single-threaded; nothing else reads the environment concurrently.
    unsafe { std::env::set_var("PROTOC", protoc_path) };

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/cosi.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/cosi.proto");
    Ok(())
}
