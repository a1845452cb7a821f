//! The named stages of one compilation, in execution order.

use std::fmt;

/// One stage of the pipeline. The driver walks [`Pass::SEQUENCE`] from
/// front to back; the function-level stages run once per parsed function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Pass {
    Parsing,
    ComplexTypeParsing,
    DataSizeCalculation,
    PreSymbolOptimization,
    DataAllocation,
    DataInitialisation,
    ResolvingSymbols,
    TypeCheck,
    SyntaxSugarReplacements,
    PostSymbolOptimization,
    FunctionTemplateParsing,
    FunctionParsing,
    PreCodeGenerationOptimization,
    RegisterAllocation,
    CodeGeneration,
}

impl Pass {
    pub const SEQUENCE: &'static [Pass] = &[
        Pass::Parsing,
        Pass::ComplexTypeParsing,
        Pass::DataSizeCalculation,
        Pass::PreSymbolOptimization,
        Pass::DataAllocation,
        Pass::DataInitialisation,
        Pass::ResolvingSymbols,
        Pass::TypeCheck,
        Pass::SyntaxSugarReplacements,
        Pass::PostSymbolOptimization,
        Pass::FunctionTemplateParsing,
        Pass::FunctionParsing,
        Pass::PreCodeGenerationOptimization,
        Pass::RegisterAllocation,
        Pass::CodeGeneration,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Pass::Parsing => "Parsing",
            Pass::ComplexTypeParsing => "ComplexTypeParsing",
            Pass::DataSizeCalculation => "DataSizeCalculation",
            Pass::PreSymbolOptimization => "PreSymbolOptimization",
            Pass::DataAllocation => "DataAllocation",
            Pass::DataInitialisation => "DataInitialisation",
            Pass::ResolvingSymbols => "ResolvingSymbols",
            Pass::TypeCheck => "TypeCheck",
            Pass::SyntaxSugarReplacements => "SyntaxSugarReplacements",
            Pass::PostSymbolOptimization => "PostSymbolOptimization",
            Pass::FunctionTemplateParsing => "FunctionTemplateParsing",
            Pass::FunctionParsing => "FunctionParsing",
            Pass::PreCodeGenerationOptimization => "PreCodeGenerationOptimization",
            Pass::RegisterAllocation => "RegisterAllocation",
            Pass::CodeGeneration => "CodeGeneration",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
