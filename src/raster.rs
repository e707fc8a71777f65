//! SVG rasterization.

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use crate::Result;
use crate::geometry::Size;

/// PNG rasterizer for serialized clock faces.
pub struct Rasterizer {
    options: Options<'static>,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        let mut options = Options::default();
        options.fontdb_mut().load_system_fonts();

        Self { options }
    }

    /// Rasterize an SVG from its text.
    ///
    /// The SVG is scaled to fill the target dimensions.
    pub fn rasterize(&self, svg: &str, size: Size) -> Result<Pixmap> {
        // Setup target buffer.
        let mut pixmap = Pixmap::new(size.width, size.height)
            .ok_or_else(|| format!("Invalid PNG buffer size: {}x{}", size.width, size.height))?;

        // Compute transform for target size.
        let tree = Tree::from_str(svg, &self.options)?;
        let target = Size::<f32>::from(size);
        let x_scale = target.width / tree.size().width();
        let y_scale = target.height / tree.size().height();
        let transform = Transform::from_scale(x_scale, y_scale);

        // Render SVG into buffer.
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        Ok(pixmap)
    }

    /// Rasterize an SVG into PNG data.
    pub fn encode_png(&self, svg: &str, size: Size) -> Result<Vec<u8>> {
        let pixmap = self.rasterize(svg, size)?;
        Ok(pixmap.encode_png()?)
    }
}
