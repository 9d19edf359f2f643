use super::*;

const CENTROID_ROW: usize = 4;
const CORRELATION_ROW: usize = 10;
const DEVIATION_ROW: usize = 13;

impl GpuContext {
    pub fn new(device: usize) -> ForceResult<Self> {
        let ctx = CudaContext::new(device).map_err(map_driver_err)?;
        let stream = ctx.default_stream();
        Ok(Self {
            inner: Arc::new(GpuContextInner {
                ctx,
                stream,
                ordinal: device,
            }),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.inner.ordinal
    }

    /// Compiles the kernels for `T` and uploads the reference tables.
    pub fn pipeline<T: DeviceReal>(
        &self,
        block_size: usize,
        reference: &GpuReference<'_, T>,
    ) -> ForceResult<GpuPipeline<T>> {
        if block_size == 0 || !block_size.is_power_of_two() || block_size > MAX_BLOCK_SIZE {
            return Err(ForceError::InvalidConfiguration(format!(
                "cuda block size must be a power of two in 1..={MAX_BLOCK_SIZE}, got {block_size}"
            )));
        }
        let n_align = reference.alignment_weights.len();
        let n_rmsd = reference.rmsd_weights.len();
        if reference.alignment.len() != 3 * n_align || reference.rmsd.len() != 3 * n_rmsd {
            return Err(ForceError::InvalidConfiguration(
                "reference coordinate tables do not match weight tables".into(),
            ));
        }
        let ptx = compile_ptx(kernel_source(T::CUDA_TYPE)).map_err(map_compile_err)?;
        let module = self.inner.ctx.load_module(ptx).map_err(map_driver_err)?;
        let kernels = Kernels::load(&module)?;
        let block = block_size as u32;
        let stream = self.inner.stream.clone();

        let align_blocks = ceil_div(n_align, block) as usize;
        let rmsd_blocks = ceil_div(n_rmsd, block) as usize;
        let partial_len = (align_blocks * CORRELATION_ROW).max(rmsd_blocks * DEVIATION_ROW);

        let align_ref = stream.clone_htod(reference.alignment).map_err(map_driver_err)?;
        let align_w = stream
            .clone_htod(reference.alignment_weights)
            .map_err(map_driver_err)?;
        let rmsd_ref = stream.clone_htod(reference.rmsd).map_err(map_driver_err)?;
        let rmsd_w = stream
            .clone_htod(reference.rmsd_weights)
            .map_err(map_driver_err)?;
        let align_pos = stream
            .alloc_zeros::<T>(3 * n_align)
            .map_err(map_driver_err)?;
        let rmsd_pos = stream
            .alloc_zeros::<T>(3 * n_rmsd)
            .map_err(map_driver_err)?;
        let rot = stream.alloc_zeros::<T>(9).map_err(map_driver_err)?;
        let gamma = stream.alloc_zeros::<T>(9).map_err(map_driver_err)?;
        let align_force = stream
            .alloc_zeros::<T>(3 * n_align)
            .map_err(map_driver_err)?;
        let rmsd_force = stream
            .alloc_zeros::<T>(3 * n_rmsd)
            .map_err(map_driver_err)?;
        let partial = stream
            .alloc_zeros::<T>(partial_len)
            .map_err(map_driver_err)?;

        Ok(GpuPipeline {
            stream,
            module,
            kernels,
            block,
            n_align,
            n_rmsd,
            align_ref,
            align_w,
            rmsd_ref,
            rmsd_w,
            align_pos,
            rmsd_pos,
            rot,
            gamma,
            align_force,
            rmsd_force,
            partial,
        })
    }
}

impl<T: DeviceReal> GpuPipeline<T> {
    pub fn block_size(&self) -> usize {
        self.block as usize
    }

    /// Overwrites the resident reference tables in place; sizes must match
    /// the ones the pipeline was built with.
    pub fn load_reference(&mut self, reference: &GpuReference<'_, T>) -> ForceResult<()> {
        if reference.alignment.len() != 3 * self.n_align
            || reference.rmsd.len() != 3 * self.n_rmsd
            || reference.alignment_weights.len() != self.n_align
            || reference.rmsd_weights.len() != self.n_rmsd
        {
            return Err(ForceError::InvalidConfiguration(
                "reference refresh cannot change set sizes".into(),
            ));
        }
        let stream = &self.stream;
        stream
            .memcpy_htod(reference.alignment, &mut self.align_ref)
            .map_err(map_driver_err)?;
        stream
            .memcpy_htod(reference.alignment_weights, &mut self.align_w)
            .map_err(map_driver_err)?;
        stream
            .memcpy_htod(reference.rmsd, &mut self.rmsd_ref)
            .map_err(map_driver_err)?;
        stream
            .memcpy_htod(reference.rmsd_weights, &mut self.rmsd_w)
            .map_err(map_driver_err)?;
        Ok(())
    }

    pub fn upload_positions(&mut self, alignment: &[T], rmsd: &[T]) -> ForceResult<()> {
        if alignment.len() != 3 * self.n_align || rmsd.len() != 3 * self.n_rmsd {
            return Err(ForceError::InvalidConfiguration(
                "position tables do not match set sizes".into(),
            ));
        }
        self.stream
            .memcpy_htod(alignment, &mut self.align_pos)
            .map_err(map_driver_err)?;
        self.stream
            .memcpy_htod(rmsd, &mut self.rmsd_pos)
            .map_err(map_driver_err)?;
        Ok(())
    }

    fn download_partial(&self, rows: usize, width: usize) -> ForceResult<Vec<T>> {
        let len = rows * width;
        let mut host = vec![T::default(); len];
        self.stream
            .memcpy_dtoh(&self.partial.slice(0..len), &mut host)
            .map_err(map_driver_err)?;
        Ok(host)
    }

    /// Per-block rows of `(Σ w x, Σ w y, Σ w z, Σ w)` over the alignment set.
    pub fn centroid_partials(&mut self) -> ForceResult<Vec<T>> {
        let n = self.n_align as i32;
        let cfg = launch_config::<T>(self.n_align, self.block, CENTROID_ROW);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.kernels.centroid_partial);
            builder.arg(&self.align_pos);
            builder.arg(&self.align_w);
            builder.arg(&n);
            builder.arg(&mut self.partial);
            builder.launch(cfg).map_err(map_driver_err)?;
        }
        self.download_partial(cfg.grid_dim.0 as usize, CENTROID_ROW)
    }

    /// Per-block rows of the correlation matrix (row-major) and `Σ w |x̃|²`.
    pub fn correlation_partials(&mut self, center: [T; 3]) -> ForceResult<Vec<T>> {
        let n = self.n_align as i32;
        let cfg = launch_config::<T>(self.n_align, self.block, CORRELATION_ROW);
        unsafe {
            let mut builder = self
                .stream
                .launch_builder(&self.kernels.correlation_partial);
            builder.arg(&self.align_pos);
            builder.arg(&self.align_ref);
            builder.arg(&self.align_w);
            builder.arg(&n);
            builder.arg(&center[0]);
            builder.arg(&center[1]);
            builder.arg(&center[2]);
            builder.arg(&mut self.partial);
            builder.launch(cfg).map_err(map_driver_err)?;
        }
        self.download_partial(cfg.grid_dim.0 as usize, CORRELATION_ROW)
    }

    /// Per-block rows of `D`, `Σ w Rᵀe` and `G = Σ w e yᵀ` over the rmsd set.
    pub fn deviation_partials(&mut self, rotation: &[T; 9], center: [T; 3]) -> ForceResult<Vec<T>> {
        self.stream
            .memcpy_htod(rotation.as_slice(), &mut self.rot)
            .map_err(map_driver_err)?;
        let n = self.n_rmsd as i32;
        let cfg = launch_config::<T>(self.n_rmsd, self.block, DEVIATION_ROW);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.kernels.deviation_partial);
            builder.arg(&self.rmsd_pos);
            builder.arg(&self.rmsd_ref);
            builder.arg(&self.rmsd_w);
            builder.arg(&self.rot);
            builder.arg(&n);
            builder.arg(&center[0]);
            builder.arg(&center[1]);
            builder.arg(&center[2]);
            builder.arg(&mut self.partial);
            builder.launch(cfg).map_err(map_driver_err)?;
        }
        self.download_partial(cfg.grid_dim.0 as usize, DEVIATION_ROW)
    }

    /// Writes forces for both sets using the rotation from the last
    /// [`Self::deviation_partials`] call. Returns flattened
    /// `(alignment_forces, rmsd_forces)`.
    pub fn project(
        &mut self,
        gamma: &[T; 9],
        h: [T; 3],
        inv_alignment_weight: T,
        scale: T,
        center: [T; 3],
    ) -> ForceResult<(Vec<T>, Vec<T>)> {
        self.stream
            .memcpy_htod(gamma.as_slice(), &mut self.gamma)
            .map_err(map_driver_err)?;
        let n_rmsd = self.n_rmsd as i32;
        let n_align = self.n_align as i32;
        let cfg_rmsd = launch_config::<T>(self.n_rmsd, self.block, 0);
        let cfg_align = launch_config::<T>(self.n_align, self.block, 0);
        unsafe {
            let mut builder = self.stream.launch_builder(&self.kernels.project_rmsd);
            builder.arg(&self.rmsd_pos);
            builder.arg(&self.rmsd_ref);
            builder.arg(&self.rmsd_w);
            builder.arg(&self.rot);
            builder.arg(&n_rmsd);
            builder.arg(&center[0]);
            builder.arg(&center[1]);
            builder.arg(&center[2]);
            builder.arg(&scale);
            builder.arg(&mut self.rmsd_force);
            builder.launch(cfg_rmsd).map_err(map_driver_err)?;
        }
        unsafe {
            let mut builder = self.stream.launch_builder(&self.kernels.project_align);
            builder.arg(&self.align_ref);
            builder.arg(&self.align_w);
            builder.arg(&self.gamma);
            builder.arg(&n_align);
            builder.arg(&h[0]);
            builder.arg(&h[1]);
            builder.arg(&h[2]);
            builder.arg(&inv_alignment_weight);
            builder.arg(&scale);
            builder.arg(&mut self.align_force);
            builder.launch(cfg_align).map_err(map_driver_err)?;
        }
        let mut align_host = vec![T::default(); 3 * self.n_align];
        let mut rmsd_host = vec![T::default(); 3 * self.n_rmsd];
        self.stream
            .memcpy_dtoh(&self.align_force, &mut align_host)
            .map_err(map_driver_err)?;
        self.stream
            .memcpy_dtoh(&self.rmsd_force, &mut rmsd_host)
            .map_err(map_driver_err)?;
        Ok((align_host, rmsd_host))
    }
}
