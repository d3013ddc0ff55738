// SPDX-License-Identifier: CEPL-1.0
use shaderapi_math::{to_row_major, Mat4, RowMajor, TransformBundle, IDENTITY_ROW_MAJOR};

/// Where `draw_mesh` reads the current transforms from.
///
/// Matrices come back in host (row-major) order.
pub trait MatrixSource {
    fn view(&self) -> RowMajor;
    fn projection(&self) -> RowMajor;
    fn model(&self) -> RowMajor;

    fn transform_bundle(&self) -> TransformBundle {
        TransformBundle::from_row_major(&self.view(), &self.projection(), &self.model())
    }
}

/// Plain current-matrix storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatrixStack {
    pub view: RowMajor,
    pub projection: RowMajor,
    pub model: RowMajor,
}

impl MatrixStack {
    pub fn set_view(&mut self, m: Mat4) {
        self.view = to_row_major(&m);
    }

    pub fn set_projection(&mut self, m: Mat4) {
        self.projection = to_row_major(&m);
    }

    pub fn set_model(&mut self, m: Mat4) {
        self.model = to_row_major(&m);
    }
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self {
            view: IDENTITY_ROW_MAJOR,
            projection: IDENTITY_ROW_MAJOR,
            model: IDENTITY_ROW_MAJOR,
        }
    }
}

impl MatrixSource for MatrixStack {
    fn view(&self) -> RowMajor {
        self.view
    }

    fn projection(&self) -> RowMajor {
        self.projection
    }

    fn model(&self) -> RowMajor {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_math::Vec3;

    #[test]
    fn stack_round_trips_through_bundle() {
        let mut s = MatrixStack::default();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let proj = Mat4::perspective_rh(1.0, 4.0 / 3.0, 0.1, 100.0);
        s.set_model(model);
        s.set_projection(proj);

        let b = s.transform_bundle();
        assert_eq!(b.model, model);
        assert_eq!(b.proj, proj);
        assert_eq!(b.view, Mat4::IDENTITY);
    }
}
