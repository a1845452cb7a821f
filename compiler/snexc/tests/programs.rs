//! End-to-end programs: compiled from source text and executed.

use pretty_assertions::assert_eq;
use snex_ir::{Block, VariableStorage};
use snexc::{compile, CapturePrint, JitObject};

fn jit(source: &str) -> JitObject {
    compile(source).expect("compiles").jit
}

#[test]
fn local_definition_returns_its_value() {
    let mut jit = jit("int test(int input) { int x = 6; return x; }");
    let out = jit
        .call("test", &[VariableStorage::Int(10)])
        .expect("call");
    assert_eq!(out.to_int(), 6);
}

#[test]
fn processes_a_full_audio_block() {
    let mut jit = jit(
        "void process(block data)
         {
             loop_block (s : data)
                 s = s * 0.5f;
         }",
    );
    let mut samples = vec![1.0f32; 512];
    jit.call(
        "process",
        &[VariableStorage::Block(Block::from_slice(&mut samples))],
    )
    .expect("call");
    assert_eq!(samples.len(), 512);
    assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn sums_a_block_into_a_scalar() {
    let mut jit = jit(
        "float sum(block data)
         {
             float total = 0.0f;
             loop_block (s : data)
                 total = total + s;
             return total;
         }",
    );
    let mut samples = vec![1.0f32; 512];
    let out = jit
        .call(
            "sum",
            &[VariableStorage::Block(Block::from_slice(&mut samples))],
        )
        .expect("call");
    assert_eq!(out.to_float(), 512.0);
}

#[test]
fn compile_output_exposes_tree_and_assembly_listings() {
    let out = compile("float gain(float x) { return x * 0.5f; }").expect("compiles");
    assert!(out.syntax_tree.contains("Function gain"));
    assert!(out.jit.assembly().contains("gain:"));
}

#[test]
fn constant_zero_divisor_fails_to_compile() {
    let err = compile("int test(int input) { int x = 6 / 0; return x; }").unwrap_err();
    assert_eq!(err.message, "Division by zero");
}

#[test]
fn post_increment_yields_the_old_value() {
    let mut jit = jit(
        "int test(int a)
         {
             int b = a++;
             return b * 100 + a;
         }",
    );
    let out = jit.call("test", &[VariableStorage::Int(41)]).expect("call");
    assert_eq!(out.to_int(), 4142);
}

#[test]
fn pre_increment_yields_the_new_value() {
    let mut jit = jit(
        "int test(int a)
         {
             int b = ++a;
             return b * 100 + a;
         }",
    );
    let out = jit.call("test", &[VariableStorage::Int(41)]).expect("call");
    assert_eq!(out.to_int(), 4242);
}

#[test]
fn globals_persist_between_calls() {
    let mut jit = jit(
        "int counter = 0;
         int tick()
         {
             counter += 1;
             return counter;
         }",
    );
    assert_eq!(jit.call("tick", &[]).expect("call").to_int(), 1);
    assert_eq!(jit.call("tick", &[]).expect("call").to_int(), 2);
    // The host reads the flushed global without calling anything.
    assert_eq!(jit.get_variable("counter").map(|v| v.to_int()), Some(2));

    assert!(jit.set_variable("counter", VariableStorage::Int(10)));
    assert_eq!(jit.call("tick", &[]).expect("call").to_int(), 11);
}

#[test]
fn span_iteration_accumulates_elements() {
    let mut jit = jit(
        "float total()
         {
             span<float, 4> values = { 1.0f, 2.0f, 3.0f, 4.0f };
             float sum = 0.0f;
             loop_span (v : values)
                 sum = sum + v;
             return sum;
         }",
    );
    let out = jit.call("total", &[]).expect("call");
    assert_eq!(out.to_float(), 10.0);
}

#[test]
fn console_print_reaches_the_host_handler() {
    let mut jit = jit(
        "void shout(int v)
         {
             Console.print(v);
             Console.print(v * 2);
         }",
    );
    let capture = CapturePrint::default();
    jit.set_print_handler(Box::new(capture.clone()));
    jit.call("shout", &[VariableStorage::Int(21)]).expect("call");
    assert_eq!(capture.take(), vec!["21".to_owned(), "42".to_owned()]);
}

#[test]
fn branches_and_comparisons_mix_types() {
    let mut jit = jit(
        "int pick(double threshold)
         {
             if (threshold > 0.5)
                 return 1;
             else
                 return 0;
         }",
    );
    let hi = jit
        .call("pick", &[VariableStorage::Double(0.9)])
        .expect("call");
    let lo = jit
        .call("pick", &[VariableStorage::Double(0.1)])
        .expect("call");
    assert_eq!((hi.to_int(), lo.to_int()), (1, 0));
}

#[test]
fn struct_state_survives_between_calls() {
    let mut jit = jit(
        "struct Filter
         {
             float last = 0.0f;
             float step(float input)
             {
                 float out = (input + last) * 0.5f;
                 last = input;
                 return out;
             }
         };
         Filter f;
         float process(float input) { return f.step(input); }",
    );
    let first = jit
        .call("process", &[VariableStorage::Float(1.0)])
        .expect("call");
    let second = jit
        .call("process", &[VariableStorage::Float(1.0)])
        .expect("call");
    assert_eq!(first.to_float(), 0.5);
    assert_eq!(second.to_float(), 1.0);
    assert_eq!(jit.get_variable("f.last").map(|v| v.to_float()), Some(1.0));
}

#[test]
fn math_intrinsics_fold_and_run() {
    let mut jit = jit(
        "double folded() { return Math.max(2.0, 3.0); }
         double live(double x) { return Math.abs(x); }",
    );
    assert_eq!(jit.call("folded", &[]).expect("call").to_double(), 3.0);
    let out = jit
        .call("live", &[VariableStorage::Double(-4.5)])
        .expect("call");
    assert_eq!(out.to_double(), 4.5);
}
