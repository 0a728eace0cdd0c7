// Code generation for the gRPC protocol definitions

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/trackmon.proto"], &["proto"])?;
    Ok(())
}
