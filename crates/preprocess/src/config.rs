/// Model input size as `(width, height)`
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (160, 160);

/// Color channels fed to the model (RGB)
pub const CHANNELS: usize = 3;

/// Largest encoded image accepted (10MB)
pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;
