/// Sample type shared with the external prediction and transform services.
pub type Pel = i16;

/// 4:2:0 sample planes sized for one CU.
///
/// One set exists per depth for each of the original, predicted, residual
/// and reconstructed signals, allocated once and reused for every CTU.
#[derive(Debug, Clone)]
pub struct YuvBuffer {
    pub width: u32,
    pub height: u32,
    pub y: Vec<Pel>,
    pub cb: Vec<Pel>,
    pub cr: Vec<Pel>,
}

impl YuvBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let luma = (width * height) as usize;
        let chroma = (width / 2 * (height / 2)) as usize;
        Self {
            width,
            height,
            y: vec![0; luma],
            cb: vec![0; chroma],
            cr: vec![0; chroma],
        }
    }

    /// Copy the quarter-size `child` buffer into the quadrant at
    /// `(x_off, y_off)` (in luma samples) of this buffer.
    pub fn copy_part_from(&mut self, child: &YuvBuffer, x_off: u32, y_off: u32) {
        copy_block(
            &mut self.y,
            self.width,
            &child.y,
            child.width,
            child.height,
            x_off,
            y_off,
        );
        copy_block(
            &mut self.cb,
            self.width / 2,
            &child.cb,
            child.width / 2,
            child.height / 2,
            x_off / 2,
            y_off / 2,
        );
        copy_block(
            &mut self.cr,
            self.width / 2,
            &child.cr,
            child.width / 2,
            child.height / 2,
            x_off / 2,
            y_off / 2,
        );
    }

    /// Fill this buffer from picture planes starting at `(x, y)`; samples
    /// outside the picture stay untouched.
    pub fn copy_from_picture(&mut self, pic: &PictureYuv, x: u32, y: u32) {
        read_block(&mut self.y, self.width, self.height, &pic.y, pic.width, pic.height, x, y);
        read_block(
            &mut self.cb,
            self.width / 2,
            self.height / 2,
            &pic.cb,
            pic.width / 2,
            pic.height / 2,
            x / 2,
            y / 2,
        );
        read_block(
            &mut self.cr,
            self.width / 2,
            self.height / 2,
            &pic.cr,
            pic.width / 2,
            pic.height / 2,
            x / 2,
            y / 2,
        );
    }

    /// Write this buffer into picture planes at `(x, y)`, clipped to the
    /// picture bounds.
    pub fn copy_to_picture(&self, pic: &mut PictureYuv, x: u32, y: u32) {
        write_block(&self.y, self.width, self.height, &mut pic.y, pic.width, pic.height, x, y);
        write_block(
            &self.cb,
            self.width / 2,
            self.height / 2,
            &mut pic.cb,
            pic.width / 2,
            pic.height / 2,
            x / 2,
            y / 2,
        );
        write_block(
            &self.cr,
            self.width / 2,
            self.height / 2,
            &mut pic.cr,
            pic.width / 2,
            pic.height / 2,
            x / 2,
            y / 2,
        );
    }
}

/// 4:2:0 sample planes covering a whole picture.
#[derive(Debug, Clone)]
pub struct PictureYuv {
    pub width: u32,
    pub height: u32,
    pub y: Vec<Pel>,
    pub cb: Vec<Pel>,
    pub cr: Vec<Pel>,
}

impl PictureYuv {
    pub fn new(width: u32, height: u32) -> Self {
        let luma = (width as usize) * (height as usize);
        let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
        Self {
            width,
            height,
            y: vec![0; luma],
            cb: vec![0; chroma],
            cr: vec![0; chroma],
        }
    }
}

fn copy_block(
    dst: &mut [Pel],
    dst_stride: u32,
    src: &[Pel],
    src_width: u32,
    src_height: u32,
    x_off: u32,
    y_off: u32,
) {
    for row in 0..src_height {
        let dst_start = ((y_off + row) * dst_stride + x_off) as usize;
        let src_start = (row * src_width) as usize;
        dst[dst_start..dst_start + src_width as usize]
            .copy_from_slice(&src[src_start..src_start + src_width as usize]);
    }
}

fn read_block(
    dst: &mut [Pel],
    dst_width: u32,
    dst_height: u32,
    src: &[Pel],
    src_width: u32,
    src_height: u32,
    x: u32,
    y: u32,
) {
    let copy_width = dst_width.min(src_width.saturating_sub(x));
    let copy_height = dst_height.min(src_height.saturating_sub(y));
    for row in 0..copy_height {
        let src_start = ((y + row) * src_width + x) as usize;
        let dst_start = (row * dst_width) as usize;
        dst[dst_start..dst_start + copy_width as usize]
            .copy_from_slice(&src[src_start..src_start + copy_width as usize]);
    }
}

fn write_block(
    src: &[Pel],
    src_width: u32,
    src_height: u32,
    dst: &mut [Pel],
    dst_width: u32,
    dst_height: u32,
    x: u32,
    y: u32,
) {
    let copy_width = src_width.min(dst_width.saturating_sub(x));
    let copy_height = src_height.min(dst_height.saturating_sub(y));
    for row in 0..copy_height {
        let dst_start = ((y + row) * dst_width + x) as usize;
        let src_start = (row * src_width) as usize;
        dst[dst_start..dst_start + copy_width as usize]
            .copy_from_slice(&src[src_start..src_start + copy_width as usize]);
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_quadrant_copy() {
        let mut parent = YuvBuffer::new(16, 16);
        let mut child = YuvBuffer::new(8, 8);
        child.y.fill(7);
        parent.copy_part_from(&child, 8, 8);
        assert_eq!(parent.y[(8 * 16 + 8) as usize], 7);
        assert_eq!(parent.y[0], 0);
    }

    #[test]
    fn test_picture_round_trip_clips_at_boundary() {
        let mut pic = PictureYuv::new(24, 24);
        let mut buf = YuvBuffer::new(16, 16);
        buf.y.fill(3);
        // Bottom-right block extends 8 samples past both picture edges.
        buf.copy_to_picture(&mut pic, 16, 16);
        assert_eq!(pic.y[(16 * 24 + 16) as usize], 3);
        assert_eq!(pic.y.len(), 24 * 24);

        let mut read_back = YuvBuffer::new(16, 16);
        read_back.copy_from_picture(&pic, 16, 16);
        assert_eq!(read_back.y[0], 3);
        // Out-of-picture area keeps the buffer's previous content.
        assert_eq!(read_back.y[8 * 16 + 8], 0);
    }
}
