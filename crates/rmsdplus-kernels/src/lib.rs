/// Device kernels for the RMSDPlus pipeline, written against a `REAL` type
/// that the host defines before compiling (see [`kernel_source`]).
pub const KERNELS_SRC: &str = concat!(
    include_str!("kernels/reduce.cu"),
    include_str!("kernels/project.cu"),
);

/// Full translation unit for one floating-point width.
pub fn kernel_source(real_type: &str) -> String {
    format!("#define REAL {real_type}\n{KERNELS_SRC}")
}
