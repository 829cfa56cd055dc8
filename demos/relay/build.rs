fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";
    let example_proto = format!("{proto_root}/netctx/v1/example.proto");

    println!("cargo:rerun-if-changed={example_proto}");
    println!("cargo:rerun-if-env-changed=NETCTX_REGEN_PROTO");

    // The generated file is checked in; regenerating needs protoc.
    if std::env::var_os("NETCTX_REGEN_PROTO").is_none() {
        return Ok(());
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto")
        .compile_protos(&[&example_proto], &[proto_root])?;

    Ok(())
}
