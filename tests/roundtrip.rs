//! Integration test over the sample modules: text roundtrips, and the
//! rewritten modules still compute the same results.

use sccp::pass::SolverOptions;
use sccp::passes::{sccp as sccp_pass, Fuel};
use sccp::{Constant, FuncDecl, InterpContext, InterpResult, Linkage, Module, Type};
use std::path::PathBuf;

fn get_irs() -> Vec<PathBuf> {
    let test_dir = std::env::current_dir()
        .unwrap()
        .join("tests")
        .join("roundtrip");
    let mut ret = vec![];
    for item in std::fs::read_dir(test_dir).unwrap() {
        let path = item.unwrap().path();
        if path.extension().and_then(|s| s.to_str()) == Some("ir") {
            ret.push(path);
        }
    }
    ret.sort(); // Deterministic test order.
    ret
}

fn load(path: &PathBuf) -> Module {
    let text = std::fs::read_to_string(path).unwrap();
    Module::from_text(&text).unwrap()
}

#[test]
fn idempotent_roundtrips() {
    for ir in get_irs() {
        let module1 = load(&ir);
        let text1 = format!("{}", module1.display());
        let module2 = Module::from_text(&text1).unwrap();
        let text2 = format!("{}", module2.display());
        assert_eq!(text1, text2, "{}", ir.display());
    }
}

#[test]
fn optimized_samples_agree() {
    for ir in get_irs() {
        let module = load(&ir);
        let opts = SolverOptions::default();
        let mut per_func = module.clone();
        sccp_pass::run_all(&mut per_func, &opts);
        let mut whole = module.clone();
        let stats = sccp_pass::run_module(&mut whole, &opts, &mut Fuel::infinite());
        log::debug!("{}: {}", ir.display(), stats);

        for opt in [&per_func, &whole] {
            let text = format!("{}", opt.display());
            Module::from_text(&text).unwrap();
        }

        let entries = module.funcs().filter(|(_, decl)| {
            matches!(decl, FuncDecl::Body(_, _, Linkage::External, _))
                && module.signature(decl.sig()).params == [Type::I32]
        });
        for (func, _) in entries {
            for arg in 0..6 {
                let args = [Constant::int(Type::I32, arg)];
                let mut ctx = InterpContext::new(&module).unwrap();
                let expected = ctx.call(&module, func, &args[..]);
                assert!(matches!(expected, InterpResult::Ok(_)), "{}", ir.display());
                for opt in [&per_func, &whole] {
                    let mut opt_ctx = InterpContext::new(opt).unwrap();
                    let result = opt_ctx.call(opt, func, &args[..]);
                    assert_eq!(expected, result, "{} arg {}", ir.display(), arg);
                    assert_eq!(ctx.globals, opt_ctx.globals, "{} arg {}", ir.display(), arg);
                }
            }
        }
    }
}
