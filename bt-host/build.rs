fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc_path = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc_path);
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/bt_host/v1/bt_host.proto"], &["proto"])?;
    Ok(())
}
