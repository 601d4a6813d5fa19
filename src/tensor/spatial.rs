//! Spatial operations over NCHW feature maps: channel concatenation,
//! im2col unfolding and bilinear resampling.

use super::Tensor;
use crate::error::{Error, Result};
use ndarray::{Array4, ArrayD, ArrayView4, Axis, Ix4, Slice};

fn view_4d<'a>(op: &'static str, data: &'a ArrayD<f32>) -> Result<ArrayView4<'a, f32>> {
    data.view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| Error::InvalidRank {
            op,
            expected: 4,
            got: data.shape().to_vec(),
        })
}

/// Per-axis sampling table for bilinear resampling with `align_corners = false`.
///
/// Output index `i` reads `lo[i]` with weight `1 - frac[i]` and `hi[i]` with
/// weight `frac[i]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinearTaps {
    pub lo: Vec<usize>,
    pub hi: Vec<usize>,
    pub frac: Vec<f32>,
}

impl LinearTaps {
    pub(crate) fn new(in_size: usize, out_size: usize) -> Self {
        let scale = in_size as f32 / out_size as f32;
        let mut taps = Self {
            lo: Vec::with_capacity(out_size),
            hi: Vec::with_capacity(out_size),
            frac: Vec::with_capacity(out_size),
        };
        for dst in 0..out_size {
            let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
            let lo = (src as usize).min(in_size - 1);
            let hi = if lo + 1 < in_size { lo + 1 } else { lo };
            taps.lo.push(lo);
            taps.hi.push(hi);
            taps.frac.push(src - lo as f32);
        }
        taps
    }
}

impl Tensor {
    /// Concatenates tensors along `axis`. All other dimensions must agree.
    pub fn concat(tensors: &[Tensor], axis: usize) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::InvalidConfig("concat needs at least one tensor".to_string()))?;
        let reference = first.shape();
        if axis >= reference.len() {
            return Err(Error::InvalidRank {
                op: "concat",
                expected: axis + 1,
                got: reference,
            });
        }

        let mut extents = Vec::with_capacity(tensors.len());
        for t in tensors {
            let shape = t.shape();
            let compatible = shape.len() == reference.len()
                && shape
                    .iter()
                    .zip(&reference)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::ShapeMismatch {
                    op: "concat",
                    left: reference,
                    right: shape,
                });
            }
            extents.push(shape[axis]);
        }

        let out_data = {
            let borrowed: Vec<_> = tensors.iter().map(|t| t.data()).collect();
            let views: Vec<_> = borrowed.iter().map(|d| d.view()).collect();
            ndarray::concatenate(Axis(axis), &views).map_err(|_| Error::ShapeMismatch {
                op: "concat",
                left: reference.clone(),
                right: Vec::new(),
            })?
        };

        let parts = tensors.to_vec();
        Ok(Tensor::from_data(out_data).with_backward(tensors.to_vec(), move |grad: &Tensor| {
            let pieces: Vec<ArrayD<f32>> = {
                let grad_data = grad.data();
                let mut start = 0;
                extents
                    .iter()
                    .map(|&len| {
                        let piece = grad_data
                            .slice_axis(Axis(axis), Slice::from(start..start + len))
                            .to_owned();
                        start += len;
                        piece
                    })
                    .collect()
            };
            for (part, piece) in parts.iter().zip(pieces) {
                part.add_grad(Tensor::from_data(piece));
            }
        }))
    }

    /// Unfolds sliding `kernel x kernel` patches of an NCHW tensor into columns.
    ///
    /// The result has shape `[C * k * k, N * H_out * W_out]`; row `r` is
    /// `(c, ki, kj)` in row-major order so a `[C_out, C, k, k]` weight can be
    /// reshaped to `[C_out, C * k * k]` and multiplied directly.
    pub fn unfold(&self, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
        if kernel == 0 || stride == 0 {
            return Err(Error::InvalidConfig(format!(
                "unfold needs a positive kernel and stride, got kernel={kernel} stride={stride}"
            )));
        }
        let (n, c, h, w) = {
            let data = self.data();
            let x = view_4d("unfold", &data)?;
            x.dim()
        };
        if h + 2 * padding < kernel || w + 2 * padding < kernel {
            return Err(Error::ShapeMismatch {
                op: "unfold",
                left: vec![n, c, h, w],
                right: vec![kernel, kernel],
            });
        }
        let h_out = (h + 2 * padding - kernel) / stride + 1;
        let w_out = (w + 2 * padding - kernel) / stride + 1;
        let geometry = Unfold {
            n,
            c,
            h,
            w,
            h_out,
            w_out,
            kernel,
            stride,
            padding,
        };

        let out_data = {
            let data = self.data();
            let x = view_4d("unfold", &data)?;
            let mut cols = ndarray::Array2::<f32>::zeros((c * kernel * kernel, n * h_out * w_out));
            geometry.for_each_tap(|row, col, idx| {
                cols[[row, col]] = x[idx];
            });
            cols.into_dyn()
        };

        let self_clone = self.clone();
        Ok(Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            let image = {
                let grad_data = grad.data();
                let mut image = Array4::<f32>::zeros((geometry.n, geometry.c, geometry.h, geometry.w));
                geometry.for_each_tap(|row, col, idx| {
                    image[idx] += grad_data[[row, col]];
                });
                image
            };
            self_clone.add_grad(Tensor::from_data(image.into_dyn()));
        }))
    }

    /// Resizes the spatial dimensions of an NCHW tensor with bilinear
    /// interpolation, `align_corners = false`.
    pub fn interpolate_bilinear(&self, size: (usize, usize)) -> Result<Tensor> {
        let (out_h, out_w) = size;
        let (n, c, in_h, in_w) = {
            let data = self.data();
            view_4d("interpolate_bilinear", &data)?.dim()
        };
        if out_h == 0 || out_w == 0 || in_h == 0 || in_w == 0 {
            return Err(Error::ShapeMismatch {
                op: "interpolate_bilinear",
                left: vec![n, c, in_h, in_w],
                right: vec![out_h, out_w],
            });
        }

        let rows = LinearTaps::new(in_h, out_h);
        let cols = LinearTaps::new(in_w, out_w);

        let out_data = {
            let data = self.data();
            let x = view_4d("interpolate_bilinear", &data)?;
            let mut out = Array4::<f32>::zeros((n, c, out_h, out_w));
            for b in 0..n {
                for ch in 0..c {
                    for oy in 0..out_h {
                        let (y0, y1, fy) = (rows.lo[oy], rows.hi[oy], rows.frac[oy]);
                        for ox in 0..out_w {
                            let (x0, x1, fx) = (cols.lo[ox], cols.hi[ox], cols.frac[ox]);
                            let top = (1.0 - fx) * x[[b, ch, y0, x0]] + fx * x[[b, ch, y0, x1]];
                            let bottom = (1.0 - fx) * x[[b, ch, y1, x0]] + fx * x[[b, ch, y1, x1]];
                            out[[b, ch, oy, ox]] = (1.0 - fy) * top + fy * bottom;
                        }
                    }
                }
            }
            out.into_dyn()
        };

        let self_clone = self.clone();
        Ok(Tensor::from_data(out_data).with_backward(vec![self.clone()], move |grad: &Tensor| {
            let grad_in = {
                let grad_data = grad.data();
                let g = match view_4d("interpolate_bilinear", &grad_data) {
                    Ok(g) => g,
                    Err(_) => return,
                };
                let mut grad_in = Array4::<f32>::zeros((n, c, in_h, in_w));
                for b in 0..n {
                    for ch in 0..c {
                        for oy in 0..out_h {
                            let (y0, y1, fy) = (rows.lo[oy], rows.hi[oy], rows.frac[oy]);
                            for ox in 0..out_w {
                                let (x0, x1, fx) = (cols.lo[ox], cols.hi[ox], cols.frac[ox]);
                                let go = g[[b, ch, oy, ox]];
                                grad_in[[b, ch, y0, x0]] += (1.0 - fy) * (1.0 - fx) * go;
                                grad_in[[b, ch, y0, x1]] += (1.0 - fy) * fx * go;
                                grad_in[[b, ch, y1, x0]] += fy * (1.0 - fx) * go;
                                grad_in[[b, ch, y1, x1]] += fy * fx * go;
                            }
                        }
                    }
                }
                grad_in
            };
            self_clone.add_grad(Tensor::from_data(grad_in.into_dyn()));
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct Unfold {
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    h_out: usize,
    w_out: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl Unfold {
    /// Visits every in-bounds `(row, col) <- [n, c, y, x]` pair; padded taps are skipped.
    fn for_each_tap(&self, mut visit: impl FnMut(usize, usize, [usize; 4])) {
        let k = self.kernel;
        for b in 0..self.n {
            for oy in 0..self.h_out {
                for ox in 0..self.w_out {
                    let col = (b * self.h_out + oy) * self.w_out + ox;
                    for ch in 0..self.c {
                        for ki in 0..k {
                            let y = (oy * self.stride + ki) as isize - self.padding as isize;
                            if y < 0 || y >= self.h as isize {
                                continue;
                            }
                            for kj in 0..k {
                                let x = (ox * self.stride + kj) as isize - self.padding as isize;
                                if x < 0 || x >= self.w as isize {
                                    continue;
                                }
                                let row = (ch * k + ki) * k + kj;
                                visit(row, col, [b, ch, y as usize, x as usize]);
                            }
                        }
                    }
                }
            }
        }
    }
}
