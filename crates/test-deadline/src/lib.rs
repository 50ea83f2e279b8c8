use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

/// Runs an async test on a fresh current-thread runtime inside a
/// watchdog thread. If the body does not finish within the deadline
/// (seconds, default 30) the test fails instead of hanging the suite.
///
/// Scheduling bugs in this workspace tend to show up as tests that
/// never complete, so integration tests use this instead of plain
/// `#[tokio::test]`.
#[proc_macro_attribute]
pub fn deadline_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut deadline_secs: u64 = 30;
    if !attr.is_empty() {
        let lit = parse_macro_input!(attr as LitInt);
        deadline_secs = match lit.base10_parse() {
            Ok(value) if value > 0 => value,
            Ok(_) => panic!("deadline must be greater than zero"),
            Err(err) => panic!("invalid deadline: {err}"),
        };
    }

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.take().is_none() {
        return syn::Error::new_spanned(&sig.ident, "deadline_test expects an async function")
            .to_compile_error()
            .into();
    }

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let deadline = std::time::Duration::from_secs(#deadline_secs);
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build test runtime")
                        .block_on(async #block);
                }));
                let _ = done_tx.send(outcome);
            });
            match done_rx.recv_timeout(deadline) {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(_) => panic!("test exceeded its {}s deadline", #deadline_secs),
            }
        }
    })
}
