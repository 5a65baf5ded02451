// SPDX-License-Identifier: CEPL-1.0
use std::{env, fs, path::PathBuf};

// Colored meshes:
//   - binding 0, location 0: R32G32B32_SFLOAT (position)
//   - binding 1, location 1: R32G32B32_SFLOAT (color)
const DEFAULT_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 iPosition;
layout(location = 1) in vec3 iColor;

layout(set = 0, binding = 0) uniform UScene {
    mat4 camera;
    mat4 projection;
    mat4 projCam;
} uScene;

layout(location = 0) out vec3 v2fColor;

void main() {
    v2fColor = iColor;
    gl_Position = uScene.projCam * vec4(iPosition, 1.0);
}
"#;

const DEFAULT_FRAG: &str = r#"
#version 450
layout(location = 0) in vec3 v2fColor;
layout(location = 0) out vec4 oColor;

void main() {
    oColor = vec4(v2fColor, 1.0);
}
"#;

// Textured meshes:
//   - binding 0, location 0: R32G32B32_SFLOAT (position)
//   - binding 1, location 1: R32G32_SFLOAT (texcoord)
//   - set 1, binding 0: combined image sampler
const TEXTURE_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 iPosition;
layout(location = 1) in vec2 iTexCoord;

layout(set = 0, binding = 0) uniform UScene {
    mat4 camera;
    mat4 projection;
    mat4 projCam;
} uScene;

layout(location = 0) out vec2 v2fTexCoord;

void main() {
    v2fTexCoord = iTexCoord;
    gl_Position = uScene.projCam * vec4(iPosition, 1.0);
}
"#;

const TEXTURE_FRAG: &str = r#"
#version 450
layout(location = 0) in vec2 v2fTexCoord;
layout(set = 1, binding = 0) uniform sampler2D uTexColor;
layout(location = 0) out vec4 oColor;

void main() {
    oColor = vec4(texture(uTexColor, v2fTexCoord).rgb, 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        ("default.vert", DEFAULT_VERT, shaderc::ShaderKind::Vertex),
        ("default.frag", DEFAULT_FRAG, shaderc::ShaderKind::Fragment),
        ("texture.vert", TEXTURE_VERT, shaderc::ShaderKind::Vertex),
        ("texture.frag", TEXTURE_FRAG, shaderc::ShaderKind::Fragment),
    ];

    for (name, src, kind) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compiling {name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {name}.spv: {e}"));
    }

    // Inline sources live here.
    println!("cargo:rerun-if-changed=build.rs");
}
