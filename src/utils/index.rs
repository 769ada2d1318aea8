/// Number of decimal places for one XMR in atomic units (piconero).
pub const XMR_DECIMALS: u32 = 12;

pub fn format_token_amount(amount: u64, decimals: u32) -> String {
	let scale = 10u64.pow(decimals);
	format!(
		"{}.{:0width$}",
		amount / scale,
		amount % scale,
		width = decimals as usize
	)
}
