// SPDX-License-Identifier: CEPL-1.0
fn main() {
    println!("cargo:rerun-if-changed=shaders/batch.vert");
    println!("cargo:rerun-if-changed=shaders/batch.frag");

    #[cfg(feature = "embed-shaders")]
    embed::compile();
}

#[cfg(feature = "embed-shaders")]
mod embed {
    use std::{env, fs, path::PathBuf};

    pub fn compile() {
        let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
        let comp = shaderc::Compiler::new().expect("shaderc compiler");
        let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (file, kind, spv) in [
            ("batch.vert", shaderc::ShaderKind::Vertex, "vert.spv"),
            ("batch.frag", shaderc::ShaderKind::Fragment, "frag.spv"),
        ] {
            let path = PathBuf::from("shaders").join(file);
            let src = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
            let art = comp
                .compile_into_spirv(&src, kind, file, "main", Some(&opts))
                .unwrap_or_else(|e| panic!("compile {file}: {e}"));
            fs::write(out.join(spv), art.as_binary_u8()).expect("write spirv");
        }
    }
}
