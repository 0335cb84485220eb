const WORKLOAD_PROTO: &str = "proto/workload.proto";

fn main() -> Result<(), anyhow::Error> {
    println!("cargo:rerun-if-changed={WORKLOAD_PROTO}");

    // protox resolves the proto in-process, so no system `protoc` is needed
    // (this also keeps docs.rs builds working).
    let file_descriptors = protox::compile([WORKLOAD_PROTO], ["proto"])?;

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(false)
        .compile_fds_with_config(file_descriptors, prost_build::Config::new())?;

    Ok(())
}
