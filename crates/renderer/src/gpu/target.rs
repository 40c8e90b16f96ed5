use wgpu::util::{DeviceExt, TextureDataOrder};

/// Off-screen color target: backing texture plus its render view.
///
/// Targets are sized to the current frame and reallocated lazily when the
/// dimensions change; the previous backing store is dropped before the new one
/// is installed.
pub(crate) struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Creates a target whose contents start at all-zero texels.
    pub(crate) fn new_zeroed(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        bytes_per_texel: u32,
    ) -> Self {
        let zeros = vec![0u8; (width.max(1) * height.max(1) * bytes_per_texel) as usize];
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &zeros,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Uploads tightly packed texel data covering the whole target.
    pub(crate) fn upload(&self, queue: &wgpu::Queue, data: &[u8], bytes_per_texel: u32) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * bytes_per_texel),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub(crate) fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Read/write index pair for double-buffered temporal state.
///
/// Exactly one side is readable at any time; [`PingPongIndex::swap`] is called
/// once per successfully completed render and never on a skipped or failed
/// frame, so a failure leaves the previous state intact.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingPongIndex {
    current: usize,
}

impl PingPongIndex {
    pub fn read(&self) -> usize {
        self.current
    }

    pub fn write(&self) -> usize {
        (self.current + 1) % 2
    }

    pub fn swap(&mut self) {
        self.current = self.write();
    }
}

#[cfg(test)]
mod tests {
    use super::PingPongIndex;

    #[test]
    fn indices_alternate_only_on_swap() {
        let mut index = PingPongIndex::default();
        assert_eq!(index.read(), 0);
        assert_eq!(index.write(), 1);

        // No swap: a skipped frame leaves both sides where they were.
        assert_eq!(index.read(), 0);
        assert_eq!(index.write(), 1);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(index.read());
            index.swap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn read_and_write_never_alias() {
        let mut index = PingPongIndex::default();
        for _ in 0..5 {
            assert_ne!(index.read(), index.write());
            index.swap();
        }
    }
}
