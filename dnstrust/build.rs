use std::process::Command;

fn main() -> anyhow::Result<()> {
    // Rebuild when the eBPF sources change
    println!("cargo:rerun-if-changed=../dnstrust-ebpf/src");

    let has_bpf_linker = Command::new("which")
        .arg("bpf-linker")
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !has_bpf_linker {
        println!("cargo:warning=bpf-linker not found, skipping eBPF build");
        println!("cargo:warning=Install with: cargo install bpf-linker");
        return Ok(());
    }

    // Build the eBPF programs (needs nightly for build-std)
    let status = Command::new("cargo")
        .args([
            "+nightly",
            "build",
            "--package=dnstrust-ebpf",
            "--release",
            "--target=bpfel-unknown-none",
            "-Z",
            "build-std=core",
        ])
        .status();

    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(_) => {
            println!("cargo:warning=Failed to build eBPF programs");
            println!("cargo:warning=Make sure nightly toolchain is installed: rustup install nightly");
            Ok(())
        }
        Err(e) => {
            println!("cargo:warning=Failed to run cargo: {}", e);
            Ok(())
        }
    }
}
