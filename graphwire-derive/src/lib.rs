mod from_repr;

use proc_macro::TokenStream;

/// Derives `fn from_repr(discriminant: <repr>) -> Option<Self>` for a fieldless enum
/// whose variants all carry an explicit discriminant. Mirrors the wire tables that show
/// up throughout this crate (token codes, field-type tags) as plain byte-keyed matches.
#[proc_macro_derive(FromRepr)]
pub fn derive_from_repr(input: TokenStream) -> TokenStream {
	from_repr::derive(input).into()
}
