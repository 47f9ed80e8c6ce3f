use bytecode::LanguageVersion;

/// Settings the code generator honours for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Stamped on every produced unit; gates the deprecated
    /// `arguments.caller` property.
    pub language_version: LanguageVersion,
    /// Give every function an activation record, even ones the generator
    /// could run on plain stack slots. Makes every call visible in the
    /// caller chain.
    pub force_activation: bool,
    pub source_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            language_version: LanguageVersion::DEFAULT,
            force_activation: false,
            source_name: "<eval>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextCreateInfo {
    /// Frames allowed on one interpreter stack before the run is aborted
    /// with a stack overflow.
    pub max_call_depth: usize,
    /// Initial capacity of each frame's value stack.
    pub stack_size: usize,
    pub compile: CompileOptions,
}

impl Default for ContextCreateInfo {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            stack_size: 64,
            compile: CompileOptions::default(),
        }
    }
}
