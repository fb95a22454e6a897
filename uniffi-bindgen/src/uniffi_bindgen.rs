//! Generates Kotlin and Swift bindings from the compiled `holderkit` library.

fn main() {
    uniffi::uniffi_bindgen_main();
}
