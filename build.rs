fn main() {
    println!("cargo:rerun-if-env-changed=SUMO_PATH");

    // Only point the linker at the engine install when the native bindings are built
    if std::env::var_os("CARGO_FEATURE_NATIVE").is_some() {
        if let Ok(path) = std::env::var("SUMO_PATH") {
            println!("cargo:rustc-link-search=native={}", path);
        }
    }
}
