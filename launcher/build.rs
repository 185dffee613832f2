use std::fs;
use std::path::Path;

fn main() {
    let proto = Path::new("proto/pipedservice.proto");
    let generated = Path::new("src/infra/generated/pipedservice.rs");

    println!("cargo:rerun-if-changed={}", proto.display());
    println!("cargo:rerun-if-changed={}", generated.display());

    assert!(
        generated.exists(),
        "missing generated gRPC source '{}'; commit generated artifacts",
        generated.display()
    );

    if let (Ok(proto_meta), Ok(gen_meta)) = (fs::metadata(proto), fs::metadata(generated))
        && let (Ok(proto_mtime), Ok(gen_mtime)) = (proto_meta.modified(), gen_meta.modified())
        && proto_mtime > gen_mtime
    {
        println!(
            "cargo:warning=proto '{}' is newer than generated Rust stubs '{}'",
            proto.display(),
            generated.display()
        );
    }
}
