fn main() -> Result<(), Box<dyn std::error::Error>> {
    // - gateway_health.proto: Health service (operator calls gateway)
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/gateway_health.proto"], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/gateway_health.proto");

    Ok(())
}
