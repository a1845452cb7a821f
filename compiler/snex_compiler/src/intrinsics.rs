//! Built-in function library: `Math`, `Console` and the event accessors.
//!
//! Every intrinsic registers three ways: a [`NativeFunction`] entry the
//! runtime dispatches through, a [`FunctionData`] signature the overload
//! resolver sees, and a namespace entry so plain symbol lookup finds the
//! name. Pure math intrinsics also carry a `pure_eval` hook so constant
//! folding can evaluate calls with immediate arguments at compile time.

use crate::functions::FunctionTable;
use smallvec::SmallVec;
use snex_codegen::{NativeCtx, NativeFn, NativeFunction};
use snex_diagnostic::CompileResult;
use snex_ir::{
    NamespacedIdentifier, Span, StringInterner, Symbol, TypeInfo, Types, VariableStorage,
};
use snex_types::{
    primitive_args, FunctionData, FunctionImpl, NamespaceHandler, PureEval, SymbolType,
    Visibility,
};

/// Native-table indices of the event field accessors, dispatched by method
/// name during type checking.
#[derive(Copy, Clone, Debug)]
pub struct EventAccessors {
    get_note: u32,
    get_velocity: u32,
    get_channel: u32,
    get_timestamp: u32,
    set_note: u32,
    set_velocity: u32,
    set_channel: u32,
    set_timestamp: u32,
}

impl EventAccessors {
    pub fn getter(&self, name: &str) -> Option<u32> {
        match name {
            "getNoteNumber" => Some(self.get_note),
            "getVelocity" => Some(self.get_velocity),
            "getChannel" => Some(self.get_channel),
            "getTimeStamp" => Some(self.get_timestamp),
            _ => None,
        }
    }

    pub fn setter(&self, name: &str) -> Option<u32> {
        match name {
            "setNoteNumber" => Some(self.set_note),
            "setVelocity" => Some(self.set_velocity),
            "setChannel" => Some(self.set_channel),
            "setTimeStamp" => Some(self.set_timestamp),
            _ => None,
        }
    }
}

macro_rules! math_unary {
    ($( $method:ident => ($pd:ident, $nd:ident, $pf:ident, $nf:ident) ),* $(,)?) => {
        $(
            fn $pd(args: &[VariableStorage]) -> VariableStorage {
                VariableStorage::Double(args[0].to_double().$method())
            }
            fn $nd(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                $pd(args)
            }
            fn $pf(args: &[VariableStorage]) -> VariableStorage {
                VariableStorage::Float(args[0].to_float().$method())
            }
            fn $nf(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                $pf(args)
            }
        )*
    };
}

math_unary! {
    sin => (p_sin_d, n_sin_d, p_sin_f, n_sin_f),
    cos => (p_cos_d, n_cos_d, p_cos_f, n_cos_f),
    tan => (p_tan_d, n_tan_d, p_tan_f, n_tan_f),
    asin => (p_asin_d, n_asin_d, p_asin_f, n_asin_f),
    acos => (p_acos_d, n_acos_d, p_acos_f, n_acos_f),
    atan => (p_atan_d, n_atan_d, p_atan_f, n_atan_f),
    sinh => (p_sinh_d, n_sinh_d, p_sinh_f, n_sinh_f),
    cosh => (p_cosh_d, n_cosh_d, p_cosh_f, n_cosh_f),
    tanh => (p_tanh_d, n_tanh_d, p_tanh_f, n_tanh_f),
    exp => (p_exp_d, n_exp_d, p_exp_f, n_exp_f),
    ln => (p_log_d, n_log_d, p_log_f, n_log_f),
    log10 => (p_log10_d, n_log10_d, p_log10_f, n_log10_f),
    sqrt => (p_sqrt_d, n_sqrt_d, p_sqrt_f, n_sqrt_f),
    abs => (p_abs_d, n_abs_d, p_abs_f, n_abs_f),
    floor => (p_floor_d, n_floor_d, p_floor_f, n_floor_f),
    ceil => (p_ceil_d, n_ceil_d, p_ceil_f, n_ceil_f),
    round => (p_round_d, n_round_d, p_round_f, n_round_f),
}

macro_rules! math_binary {
    ($( ($pd:ident, $nd:ident, $pf:ident, $nf:ident) => $f:expr ),* $(,)?) => {
        $(
            fn $pd(args: &[VariableStorage]) -> VariableStorage {
                let f: fn(f64, f64) -> f64 = $f;
                VariableStorage::Double(f(args[0].to_double(), args[1].to_double()))
            }
            fn $nd(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                $pd(args)
            }
            fn $pf(args: &[VariableStorage]) -> VariableStorage {
                let f: fn(f32, f32) -> f32 = $f;
                VariableStorage::Float(f(args[0].to_float(), args[1].to_float()))
            }
            fn $nf(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                $pf(args)
            }
        )*
    };
}

math_binary! {
    (p_pow_d, n_pow_d, p_pow_f, n_pow_f) => |a, b| a.powf(b),
    (p_fmod_d, n_fmod_d, p_fmod_f, n_fmod_f) => |a, b| a % b,
    (p_atan2_d, n_atan2_d, p_atan2_f, n_atan2_f) => |a, b| a.atan2(b),
    (p_min_d, n_min_d, p_min_f, n_min_f) => |a, b| a.min(b),
    (p_max_d, n_max_d, p_max_f, n_max_f) => |a, b| a.max(b),
}

macro_rules! math_int {
    ($( ($p:ident, $n:ident, $arity:literal) => $f:expr ),* $(,)?) => {
        $(
            fn $p(args: &[VariableStorage]) -> VariableStorage {
                let f = $f;
                VariableStorage::Int(f(args))
            }
            fn $n(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                $p(args)
            }
        )*
    };
}

math_int! {
    (p_abs_i, n_abs_i, 1) => |args: &[VariableStorage]| args[0].to_int().abs(),
    (p_min_i, n_min_i, 2) => |args: &[VariableStorage]| args[0].to_int().min(args[1].to_int()),
    (p_max_i, n_max_i, 2) => |args: &[VariableStorage]| args[0].to_int().max(args[1].to_int()),
}

fn console_print(ctx: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
    let text = match args[0] {
        VariableStorage::Int(v) => v.to_string(),
        VariableStorage::Float(v) => v.to_string(),
        VariableStorage::Double(v) => v.to_string(),
        other => other.to_string(),
    };
    ctx.print.print(&text);
    VariableStorage::Void
}

fn event_with_field(e: snex_ir::Event, field: &str, v: i64) -> snex_ir::Event {
    let mut e = e;
    match field {
        "note" => e.note_number = v as u8,
        "velocity" => e.velocity = v as u8,
        "channel" => e.channel = v as u8,
        _ => e.timestamp = v as u32,
    }
    e
}

macro_rules! event_accessor {
    ($( $getter:ident / $setter:ident => $field:tt ),* $(,)?) => {
        $(
            fn $getter(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                let e = args[0].to_event();
                VariableStorage::Int(i64::from(event_accessor!(@read e, $field)))
            }
            fn $setter(_: &mut NativeCtx<'_>, args: &[VariableStorage]) -> VariableStorage {
                VariableStorage::Event(event_with_field(
                    args[0].to_event(),
                    stringify!($field),
                    args[1].to_int(),
                ))
            }
        )*
    };
    (@read $e:ident, note) => { $e.note_number };
    (@read $e:ident, velocity) => { $e.velocity };
    (@read $e:ident, channel) => { $e.channel };
    (@read $e:ident, timestamp) => { $e.timestamp };
}

event_accessor! {
    ev_get_note / ev_set_note => note,
    ev_get_velocity / ev_set_velocity => velocity,
    ev_get_channel / ev_set_channel => channel,
    ev_get_timestamp / ev_set_timestamp => timestamp,
}

fn push_native(
    natives: &mut Vec<NativeFunction>,
    name: String,
    return_type: Types,
    arg_types: &[Types],
    func: NativeFn,
) -> u32 {
    let index = natives.len() as u32;
    natives.push(NativeFunction {
        name,
        return_type,
        arg_types: arg_types.iter().copied().collect(),
        func,
    });
    index
}

struct IntrinsicReg<'a> {
    interner: &'a mut StringInterner,
    namespaces: &'a mut NamespaceHandler,
    functions: &'a mut FunctionTable,
    natives: &'a mut Vec<NativeFunction>,
}

impl IntrinsicReg<'_> {
    fn add(
        &mut self,
        id: &NamespacedIdentifier,
        ret: Types,
        args: &[Types],
        func: NativeFn,
        pure_eval: PureEval,
    ) -> CompileResult<()> {
        let index = push_native(
            self.natives,
            id.display(self.interner).to_string(),
            ret,
            args,
            func,
        );
        let arg_syms = primitive_args(id, args, self.interner);
        let mut data = FunctionData::new(id.clone(), TypeInfo::Primitive(ret)).with_args(arg_syms);
        data.is_const = true;
        data.implementation = FunctionImpl::Native(index);
        data.pure_eval = Some(pure_eval);
        self.functions.add(data);

        // Overloads share one namespace entry; repeated function
        // registration is allowed.
        self.namespaces.register(
            Symbol::new(id.clone(), TypeInfo::Primitive(ret)),
            SymbolType::Function,
            Visibility::Public,
            Span::DUMMY,
            self.interner,
        )?;
        Ok(())
    }
}

/// Register the whole intrinsic library: `Math` (functions and the `PI`/`E`
/// constants), `Console::print`, and the event accessors. Returns the
/// accessor indices for method dispatch.
pub fn register_intrinsics(
    interner: &mut StringInterner,
    namespaces: &mut NamespaceHandler,
    functions: &mut FunctionTable,
    natives: &mut Vec<NativeFunction>,
) -> CompileResult<EventAccessors> {
    let math = NamespacedIdentifier::new(interner.intern("Math"));
    let console = NamespacedIdentifier::new(interner.intern("Console"));

    let unary: &[(&str, NativeFn, PureEval, NativeFn, PureEval)] = &[
        ("sin", n_sin_d, p_sin_d, n_sin_f, p_sin_f),
        ("cos", n_cos_d, p_cos_d, n_cos_f, p_cos_f),
        ("tan", n_tan_d, p_tan_d, n_tan_f, p_tan_f),
        ("asin", n_asin_d, p_asin_d, n_asin_f, p_asin_f),
        ("acos", n_acos_d, p_acos_d, n_acos_f, p_acos_f),
        ("atan", n_atan_d, p_atan_d, n_atan_f, p_atan_f),
        ("sinh", n_sinh_d, p_sinh_d, n_sinh_f, p_sinh_f),
        ("cosh", n_cosh_d, p_cosh_d, n_cosh_f, p_cosh_f),
        ("tanh", n_tanh_d, p_tanh_d, n_tanh_f, p_tanh_f),
        ("exp", n_exp_d, p_exp_d, n_exp_f, p_exp_f),
        ("log", n_log_d, p_log_d, n_log_f, p_log_f),
        ("log10", n_log10_d, p_log10_d, n_log10_f, p_log10_f),
        ("sqrt", n_sqrt_d, p_sqrt_d, n_sqrt_f, p_sqrt_f),
        ("abs", n_abs_d, p_abs_d, n_abs_f, p_abs_f),
        ("floor", n_floor_d, p_floor_d, n_floor_f, p_floor_f),
        ("ceil", n_ceil_d, p_ceil_d, n_ceil_f, p_ceil_f),
        ("round", n_round_d, p_round_d, n_round_f, p_round_f),
    ];
    let binary: &[(&str, NativeFn, PureEval, NativeFn, PureEval)] = &[
        ("pow", n_pow_d, p_pow_d, n_pow_f, p_pow_f),
        ("fmod", n_fmod_d, p_fmod_d, n_fmod_f, p_fmod_f),
        ("atan2", n_atan2_d, p_atan2_d, n_atan2_f, p_atan2_f),
        ("min", n_min_d, p_min_d, n_min_f, p_min_f),
        ("max", n_max_d, p_max_d, n_max_f, p_max_f),
    ];

    let mut reg = IntrinsicReg {
        interner,
        namespaces,
        functions,
        natives,
    };

    for &(name, nd, pd, nf, pf) in unary {
        let id = math.child(reg.interner.intern(name));
        reg.add(&id, Types::Double, &[Types::Double], nd, pd)?;
        reg.add(&id, Types::Float, &[Types::Float], nf, pf)?;
    }
    for &(name, nd, pd, nf, pf) in binary {
        let id = math.child(reg.interner.intern(name));
        reg.add(&id, Types::Double, &[Types::Double, Types::Double], nd, pd)?;
        reg.add(&id, Types::Float, &[Types::Float, Types::Float], nf, pf)?;
    }
    for &(name, n, p, args) in &[
        ("abs", n_abs_i as NativeFn, p_abs_i as PureEval, 1usize),
        ("min", n_min_i, p_min_i, 2),
        ("max", n_max_i, p_max_i, 2),
    ] {
        let id = math.child(reg.interner.intern(name));
        let arg_types: SmallVec<[Types; 4]> =
            std::iter::repeat(Types::Integer).take(args).collect();
        reg.add(&id, Types::Integer, &arg_types, n, p)?;
    }

    let print = console.child(reg.interner.intern("print"));
    for ty in [Types::Integer, Types::Float, Types::Double] {
        let index = push_native(
            reg.natives,
            print.display(reg.interner).to_string(),
            Types::Void,
            &[ty],
            console_print,
        );
        let arg_syms = primitive_args(&print, &[ty], reg.interner);
        let mut data =
            FunctionData::new(print.clone(), TypeInfo::Primitive(Types::Void)).with_args(arg_syms);
        data.implementation = FunctionImpl::Native(index);
        reg.functions.add(data);
        reg.namespaces.register(
            Symbol::new(print.clone(), TypeInfo::Primitive(Types::Void)),
            SymbolType::Function,
            Visibility::Public,
            Span::DUMMY,
            reg.interner,
        )?;
    }

    let pi = reg.interner.intern("PI");
    let e = reg.interner.intern("E");
    reg.namespaces.push(math.id());
    reg.namespaces.add_constant(
        pi,
        VariableStorage::Double(std::f64::consts::PI),
        SymbolType::Constant,
        Span::DUMMY,
        reg.interner,
    )?;
    reg.namespaces.add_constant(
        e,
        VariableStorage::Double(std::f64::consts::E),
        SymbolType::Constant,
        Span::DUMMY,
        reg.interner,
    )?;
    reg.namespaces.pop();

    let getter_args = &[Types::Event];
    let setter_args = &[Types::Event, Types::Integer];
    let getter = |natives: &mut Vec<NativeFunction>, name: &str, f: NativeFn| {
        push_native(natives, name.to_owned(), Types::Integer, getter_args, f)
    };
    let get_note = getter(reg.natives, "Event::getNoteNumber", ev_get_note);
    let get_velocity = getter(reg.natives, "Event::getVelocity", ev_get_velocity);
    let get_channel = getter(reg.natives, "Event::getChannel", ev_get_channel);
    let get_timestamp = getter(reg.natives, "Event::getTimeStamp", ev_get_timestamp);
    let setter = |natives: &mut Vec<NativeFunction>, name: &str, f: NativeFn| {
        push_native(natives, name.to_owned(), Types::Event, setter_args, f)
    };
    let set_note = setter(reg.natives, "Event::setNoteNumber", ev_set_note);
    let set_velocity = setter(reg.natives, "Event::setVelocity", ev_set_velocity);
    let set_channel = setter(reg.natives, "Event::setChannel", ev_set_channel);
    let set_timestamp = setter(reg.natives, "Event::setTimeStamp", ev_set_timestamp);

    Ok(EventAccessors {
        get_note,
        get_velocity,
        get_channel,
        get_timestamp,
        set_note,
        set_velocity,
        set_channel,
        set_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registered() -> (
        StringInterner,
        NamespaceHandler,
        FunctionTable,
        Vec<NativeFunction>,
        EventAccessors,
    ) {
        let mut interner = StringInterner::new();
        let mut namespaces = NamespaceHandler::new();
        let mut functions = FunctionTable::new();
        let mut natives = Vec::new();
        let accessors =
            register_intrinsics(&mut interner, &mut namespaces, &mut functions, &mut natives)
                .expect("register");
        (interner, namespaces, functions, natives, accessors)
    }

    #[test]
    fn sin_resolves_per_overload() {
        let (mut interner, _, functions, _, _) = registered();
        let sin = NamespacedIdentifier::new(interner.intern("Math")).child(interner.intern("sin"));
        let f = functions
            .resolve(
                &sin,
                &[TypeInfo::Primitive(Types::Float)],
                true,
                Span::DUMMY,
                &interner,
            )
            .expect("resolve");
        assert_eq!(f.return_type, TypeInfo::Primitive(Types::Float));
        let pure = f.pure_eval.expect("pure");
        let v = pure(&[VariableStorage::Float(0.0)]);
        assert_eq!(v, VariableStorage::Float(0.0));
    }

    #[test]
    fn pi_is_a_namespace_constant() {
        let (mut interner, namespaces, _, _, _) = registered();
        let pi = NamespacedIdentifier::new(interner.intern("Math")).child(interner.intern("PI"));
        let item = namespaces.get(&pi).expect("Math::PI");
        assert_eq!(
            item.symbol.constant,
            Some(VariableStorage::Double(std::f64::consts::PI))
        );
    }

    #[test]
    fn event_accessors_dispatch_by_name() {
        let (_, _, _, natives, accessors) = registered();
        let idx = accessors.getter("getNoteNumber").expect("getter");
        assert_eq!(natives[idx as usize].name, "Event::getNoteNumber");
        assert!(accessors.setter("setVolume").is_none());

        let e = snex_ir::Event::note_on(1, 64, 100);
        let mut print = snex_codegen::CapturePrint::default();
        let mut ctx = NativeCtx {
            print: &mut print,
            blocks: &[],
        };
        let got = (natives[idx as usize].func)(&mut ctx, &[VariableStorage::Event(e)]);
        assert_eq!(got, VariableStorage::Int(64));

        let set = accessors.setter("setVelocity").expect("setter");
        let updated = (natives[set as usize].func)(
            &mut ctx,
            &[VariableStorage::Event(e), VariableStorage::Int(30)],
        );
        assert_eq!(updated.to_event().velocity, 30);
    }

    #[test]
    fn integer_min_folds() {
        let (mut interner, _, functions, _, _) = registered();
        let min = NamespacedIdentifier::new(interner.intern("Math")).child(interner.intern("min"));
        let f = functions
            .resolve(
                &min,
                &[
                    TypeInfo::Primitive(Types::Integer),
                    TypeInfo::Primitive(Types::Integer),
                ],
                true,
                Span::DUMMY,
                &interner,
            )
            .expect("resolve");
        let pure = f.pure_eval.expect("pure");
        assert_eq!(
            pure(&[VariableStorage::Int(4), VariableStorage::Int(9)]),
            VariableStorage::Int(4)
        );
    }
}
