fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(&["proto/broker.proto", "proto/feed.proto"], &["proto"])?;
    Ok(())
}
