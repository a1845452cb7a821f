//! Namespace handling, symbol tables, complex-type layout and function
//! signatures for the SNEX compiler.

mod complex;
mod function;
mod namespace;
mod template;

pub use complex::{ComplexType, ComplexTypeKind, ComplexTypeRegistry, StructMember};
pub use function::{primitive_args, FunctionClass, FunctionData, FunctionImpl, PureEval};
pub use namespace::{NamespaceHandler, RegisteredItem, SymbolType, Visibility};
pub use template::{
    Instantiation, TemplateArg, TemplateKind, TemplateObject, TemplateParamKind,
    TemplateParameter, TemplateRegistry,
};
