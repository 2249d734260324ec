use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory/application.x");
    println!("cargo:rerun-if-changed=memory/bootloader.x");

    // Only bare-metal builds get a linker script; host tests link normally.
    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("thumbv7em-none-eabi") {
        return;
    }

    let layout = if env::var_os("CARGO_FEATURE_BOOTLOADER").is_some() {
        "memory/bootloader.x"
    } else {
        "memory/application.x"
    };

    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::copy(layout, out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());
}
