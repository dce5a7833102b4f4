use rand::Rng;

pub const CODE_LENGTH: usize = 6;

/// Source of verification codes. Swappable so tests can pin the code.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform 6-digit numeric codes, zero padded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{value:0width$}", width = CODE_LENGTH)
    }
}
