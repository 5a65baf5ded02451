// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::io::Cursor;

use anyhow::{anyhow, Result};
use ash::util::read_spv;
use ash::vk;

use crate::error::VkResultExt;
use crate::mesh::MeshBatch;

const POSITION_STRIDE: u32 = 3 * std::mem::size_of::<f32>() as u32;
const COLOR_STRIDE: u32 = 3 * std::mem::size_of::<f32>() as u32;
const TEXCOORD_STRIDE: u32 = 2 * std::mem::size_of::<f32>() as u32;

const ENTRY: &CStr = c"main";

/// Two non-interleaved streams: position at binding 0, the per-batch
/// attribute (color or texcoord) at binding 1.
pub fn vertex_bindings(
    batch: MeshBatch,
) -> (
    [vk::VertexInputBindingDescription; 2],
    [vk::VertexInputAttributeDescription; 2],
) {
    let (stride, format) = match batch {
        MeshBatch::Colored => (COLOR_STRIDE, vk::Format::R32G32B32_SFLOAT),
        MeshBatch::Textured => (TEXCOORD_STRIDE, vk::Format::R32G32_SFLOAT),
    };
    let bindings = [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: POSITION_STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        },
    ];
    let attributes = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 1,
            format,
            offset: 0,
        },
    ];
    (bindings, attributes)
}

fn shader_bytes(batch: MeshBatch) -> (&'static [u8], &'static [u8]) {
    match batch {
        MeshBatch::Colored => (
            include_bytes!(concat!(env!("OUT_DIR"), "/default.vert.spv")),
            include_bytes!(concat!(env!("OUT_DIR"), "/default.frag.spv")),
        ),
        MeshBatch::Textured => (
            include_bytes!(concat!(env!("OUT_DIR"), "/texture.vert.spv")),
            include_bytes!(concat!(env!("OUT_DIR"), "/texture.frag.spv")),
        ),
    }
}

unsafe fn create_shader_module(
    device: &ash::Device,
    bytes: &[u8],
    label: &str,
) -> Result<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes))?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device
        .create_shader_module(&ci, None)
        .vk_call("create_shader_module", label)?)
}

// STRICT: attachment 0 is the swapchain colour image, attachment 1 the depth
// buffer. Framebuffers and the clear-value array follow the same order.
pub unsafe fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };

    // Orders the first colour/depth writes after the acquire semaphore wait
    // and after the previous use of the shared depth buffer.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device
        .create_render_pass(&rp_info, None)
        .vk_call("create_render_pass", format_args!("{color_format:?} + {depth_format:?}"))?)
}

/// Set 0 = scene uniform, set 1 = per-mesh texture. Both pipelines share it.
pub unsafe fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: set_layouts.len() as u32,
        p_set_layouts: set_layouts.as_ptr(),
        ..Default::default()
    };
    Ok(device
        .create_pipeline_layout(&layout_info, None)
        .vk_call("create_pipeline_layout", "scene pipeline layout")?)
}

// STRICT: viewport and scissor are baked in, so the pipeline must be rebuilt
// whenever the swapchain extent changes, and whenever the render pass does.
pub unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    batch: MeshBatch,
) -> Result<vk::Pipeline> {
    let label = format!("{batch:?} pipeline");

    // --- Shader modules (destroyed before return) ---
    let (vs_bytes, fs_bytes) = shader_bytes(batch);
    let vs = create_shader_module(device, vs_bytes, &label)?;
    let fs = match create_shader_module(device, fs_bytes, &label) {
        Ok(fs) => fs,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    // --- Fixed-function state ---
    let (bindings, attributes) = vertex_bindings(batch);
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: bindings.len() as u32,
        p_vertex_binding_descriptions: bindings.as_ptr(),
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        max_depth_bounds: 1.0,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let created = device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    );
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    let pipelines = created
        .map_err(|(_, code)| code)
        .vk_call("create_graphics_pipelines", &label)?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("create_graphics_pipelines returned nothing for {label}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colored_streams_are_two_vec3() {
        let (b, a) = vertex_bindings(MeshBatch::Colored);
        assert_eq!((b[0].stride, b[1].stride), (12, 12));
        assert_eq!(a[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn textured_streams_are_vec3_and_vec2() {
        let (b, a) = vertex_bindings(MeshBatch::Textured);
        assert_eq!((b[0].stride, b[1].stride), (12, 8));
        assert_eq!(a[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!((a[0].binding, a[1].binding), (0, 1));
        assert_eq!((a[0].location, a[1].location), (0, 1));
    }
}
