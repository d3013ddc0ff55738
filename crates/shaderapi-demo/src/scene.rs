// SPDX-License-Identifier: CEPL-1.0
//! A grid of spinning primitives, one `draw_mesh` each.
use shaderapi_device::{
    IndexBufferHandle, MatrixStack, Mesh, PrimitiveType, ShaderDevice, Vertex, VertexBufferHandle,
};
use shaderapi_math::{Mat4, Vec3};

const SPACING: f32 = 2.5;

struct Shape {
    vb: VertexBufferHandle,
    ib: IndexBufferHandle,
    mesh: Mesh,
}

pub struct Scene {
    shapes: Vec<Shape>,
    matrices: MatrixStack,
    count: u32,
    spin: f32,
}

fn upload(
    dev: &mut dyn ShaderDevice,
    vertices: &[Vertex],
    indices: &[u16],
    primitive: PrimitiveType,
) -> Shape {
    let vb = dev.create_vertex_buffer(vertices);
    let ib = dev.create_index_buffer(indices);
    Shape {
        vb,
        ib,
        mesh: Mesh {
            vertex_buffer: vb,
            index_buffer: ib,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            primitive,
        },
    }
}

/// Column count of the smallest square grid holding `n` cells.
fn grid_side(n: u32) -> u32 {
    let mut side = 1;
    while side * side < n {
        side += 1;
    }
    side
}

fn cell_origin(i: u32, side: u32) -> Vec3 {
    let half = (side as f32 - 1.0) * 0.5;
    Vec3::new(
        ((i % side) as f32 - half) * SPACING,
        ((i / side) as f32 - half) * SPACING,
        0.0,
    )
}

impl Scene {
    pub fn new(dev: &mut dyn ShaderDevice, count: u32, spin: f32) -> Self {
        const RED: [f32; 4] = [0.9, 0.2, 0.2, 1.0];
        const GREEN: [f32; 4] = [0.2, 0.9, 0.3, 1.0];
        const BLUE: [f32; 4] = [0.2, 0.4, 0.95, 1.0];
        const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 0.8];

        let triangle = upload(
            dev,
            &[
                Vertex::new([0.0, 0.8, 0.0], RED),
                Vertex::new([0.7, -0.6, 0.0], GREEN),
                Vertex::new([-0.7, -0.6, 0.0], BLUE),
            ],
            &[0, 1, 2],
            PrimitiveType::Triangles,
        );
        let quad = upload(
            dev,
            &[
                Vertex::new([-0.7, -0.7, 0.0], BLUE),
                Vertex::new([-0.7, 0.7, 0.0], GREEN),
                Vertex::new([0.7, -0.7, 0.0], RED),
                Vertex::new([0.7, 0.7, 0.0], WHITE),
            ],
            &[0, 1, 2, 3],
            PrimitiveType::TriangleStrip,
        );
        let outline = upload(
            dev,
            &[
                Vertex::new([-0.8, -0.8, 0.0], WHITE),
                Vertex::new([0.8, -0.8, 0.0], WHITE),
                Vertex::new([0.8, 0.8, 0.0], GREEN),
                Vertex::new([-0.8, 0.8, 0.0], GREEN),
            ],
            &[0, 1, 2, 3, 0],
            PrimitiveType::LineStrip,
        );
        let points = upload(
            dev,
            &[
                Vertex::new([-0.5, 0.0, 0.0], RED),
                Vertex::new([0.0, 0.5, 0.0], GREEN),
                Vertex::new([0.5, 0.0, 0.0], BLUE),
                Vertex::new([0.0, -0.5, 0.0], WHITE),
            ],
            &[0, 1, 2, 3],
            PrimitiveType::Points,
        );

        Self {
            shapes: vec![triangle, quad, outline, points],
            matrices: MatrixStack::default(),
            count,
            spin,
        }
    }

    /// Queues every mesh for the next present. `t` is seconds since start.
    pub fn draw(&mut self, dev: &mut dyn ShaderDevice, t: f32) {
        let size = dev.back_buffer_size();
        if size.is_empty() {
            return;
        }
        let side = grid_side(self.count);
        let aspect = size.width as f32 / size.height as f32;
        let distance = side as f32 * SPACING * 1.2 + 2.0;
        self.matrices.set_view(Mat4::look_at_rh(
            Vec3::new(0.0, 0.0, distance),
            Vec3::ZERO,
            Vec3::Y,
        ));
        self.matrices
            .set_projection(Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0));

        for i in 0..self.count {
            let shape = &self.shapes[i as usize % self.shapes.len()];
            let angle = t * self.spin + i as f32 * 0.35;
            self.matrices.set_model(
                Mat4::from_translation(cell_origin(i, side)) * Mat4::from_rotation_z(angle),
            );
            dev.draw_mesh(&shape.mesh, &self.matrices);
        }
    }

    pub fn destroy(self, dev: &mut dyn ShaderDevice) {
        for s in self.shapes {
            dev.destroy_vertex_buffer(s.vb);
            dev.destroy_index_buffer(s.ib);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_device::recording::{DeviceCall, RecordingShaderDevice};
    use shaderapi_device::RenderSize;

    fn device(size: RenderSize) -> RecordingShaderDevice {
        let mut dev = RecordingShaderDevice::new();
        dev.resize(size);
        dev
    }

    #[test]
    fn grid_is_square_enough() {
        assert_eq!(grid_side(0), 1);
        assert_eq!(grid_side(1), 1);
        assert_eq!(grid_side(4), 2);
        assert_eq!(grid_side(5), 3);
        assert_eq!(grid_side(16), 4);
        assert_eq!(cell_origin(0, 1), Vec3::ZERO);
        assert_eq!(cell_origin(0, 2), Vec3::new(-1.25, -1.25, 0.0));
    }

    #[test]
    fn draws_requested_count_cycling_shapes() {
        let mut dev = device(RenderSize::new(800, 600));
        let mut scene = Scene::new(&mut dev, 6, 1.0);
        scene.draw(&mut dev, 0.5);
        dev.present();

        let prims: Vec<PrimitiveType> = dev.draws().map(|m| m.primitive).collect();
        assert_eq!(
            prims,
            [
                PrimitiveType::Triangles,
                PrimitiveType::TriangleStrip,
                PrimitiveType::LineStrip,
                PrimitiveType::Points,
                PrimitiveType::Triangles,
                PrimitiveType::TriangleStrip,
            ]
        );
        assert_eq!(dev.presents().collect::<Vec<_>>(), [6]);
    }

    #[test]
    fn meshes_reference_uploaded_data() {
        let mut dev = device(RenderSize::new(800, 600));
        let mut scene = Scene::new(&mut dev, 4, 0.0);
        scene.draw(&mut dev, 0.0);
        for m in dev.draws() {
            let v = dev.vertex_buffer(m.vertex_buffer).unwrap();
            let i = dev.index_buffer(m.index_buffer).unwrap();
            assert_eq!(v.len() as u32, m.vertex_count);
            assert_eq!(i.len() as u32, m.index_count);
            assert!(i.iter().all(|&ix| (ix as usize) < v.len()));
        }
    }

    #[test]
    fn each_draw_snapshots_its_own_model() {
        let mut dev = device(RenderSize::new(800, 600));
        let mut scene = Scene::new(&mut dev, 2, 0.0);
        scene.draw(&mut dev, 0.0);
        let models: Vec<Mat4> = dev
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw { transforms, .. } => Some(transforms.model),
                _ => None,
            })
            .collect();
        assert_eq!(models.len(), 2);
        assert_ne!(models[0], models[1]);
    }

    #[test]
    fn minimised_window_draws_nothing() {
        let mut dev = device(RenderSize::new(0, 0));
        let mut scene = Scene::new(&mut dev, 4, 1.0);
        scene.draw(&mut dev, 1.0);
        assert_eq!(dev.draws().count(), 0);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut dev = device(RenderSize::new(800, 600));
        let scene = Scene::new(&mut dev, 4, 1.0);
        assert_eq!(dev.live_resources(), 8);
        scene.destroy(&mut dev);
        assert_eq!(dev.live_resources(), 0);
    }
}
