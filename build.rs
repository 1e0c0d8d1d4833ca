// Build script to compile GLSL shaders to SPIR-V
//
// Every shaders/*.vert and shaders/*.frag is compiled to shaders/<name>.spv
// next to its source. The binaries are loaded at runtime, so a missing glslc
// is only a warning.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "shaders";
const STAGES: &[&str] = &["vert", "frag"];

fn main() {
    println!("cargo:rerun-if-changed={}", SHADER_DIR);

    let entries = match fs::read_dir(SHADER_DIR) {
        Ok(entries) => entries,
        Err(e) => {
            println!("cargo:warning=Cannot read {}: {}", SHADER_DIR, e);
            return;
        }
    };

    for entry in entries.flatten() {
        let input = entry.path();
        let is_source = input
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        if !is_source {
            continue;
        }

        println!("cargo:rerun-if-changed={}", input.display());
        let output = spirv_path(&input);
        if is_up_to_date(&input, &output) {
            continue;
        }
        compile_shader(&input, &output);
    }
}

/// shaders/shader.vert -> shaders/shader.vert.spv
fn spirv_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".spv");
    PathBuf::from(name)
}

fn is_up_to_date(input: &Path, output: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(input), modified(output)) {
        (Some(src), Some(spv)) => spv >= src,
        _ => false,
    }
}

fn compile_shader(input: &Path, output: &Path) {
    let result = Command::new("glslc").arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input.display(), output.display());
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input.display(), status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} not compiled", e, input.display());
            println!(
                "cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}",
                input.display(),
                output.display()
            );
        }
    }
}
