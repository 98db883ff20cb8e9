// ===============================
// src/engine.rs (trade engine: semua critical section ada di sini)
// ===============================
//
// Tiga operasi:
// - buy_from_market / sell_to_market : lock Market -> lock Trader
// - transfer (P2P)                   : baca harga live, lalu lock_pair (id naik)
//
// Guard di-drop dalam urutan terbalik dari akuisisi (local terakhir drop duluan).
// Tidak ada .await di dalam fungsi ini; guard parking_lot juga !Send.
//
use rand::Rng;

use crate::domain::{DeclineReason, Side, Symbol, TradeOutcome};
use crate::market::Market;
use crate::trader::{lock_pair, Trader};

pub fn buy_from_market<R: Rng>(
    market: &Market,
    trader: &Trader,
    symbol: &Symbol,
    rng: &mut R,
) -> TradeOutcome {
    let mut book = market.lock();
    let mut ledger = trader.lock();

    let Some(price) = book.price(symbol) else {
        return TradeOutcome::Declined(DeclineReason::UnknownSymbol);
    };
    if book.inventory(symbol) == 0 {
        return TradeOutcome::Declined(DeclineReason::OutOfStock);
    }
    // debit satu-satunya langkah yang bisa gagal, jadi jalan paling awal
    if !ledger.debit(price) {
        return TradeOutcome::Declined(DeclineReason::InsufficientCash);
    }
    book.take_share(symbol);
    book.credit(price);
    ledger.add_share(symbol);

    let next = market.rule().after_buy(price, rng);
    book.set_price(symbol, next);
    TradeOutcome::Filled { price }
}

pub fn sell_to_market<R: Rng>(
    market: &Market,
    trader: &Trader,
    symbol: &Symbol,
    rng: &mut R,
) -> TradeOutcome {
    let mut book = market.lock();
    let mut ledger = trader.lock();

    let Some(price) = book.price(symbol) else {
        return TradeOutcome::Declined(DeclineReason::UnknownSymbol);
    };
    if ledger.holding(symbol) == 0 {
        return TradeOutcome::Declined(DeclineReason::NoHoldings);
    }
    if !book.debit(price) {
        return TradeOutcome::Declined(DeclineReason::MarketIlliquid);
    }
    ledger.remove_share(symbol);
    ledger.credit(price);
    book.return_share(symbol);

    let next = market.rule().after_sell(price, rng);
    book.set_price(symbol, next);
    TradeOutcome::Filled { price }
}

/// Market order in either direction.
pub fn trade_with_market<R: Rng>(
    market: &Market,
    trader: &Trader,
    symbol: &Symbol,
    side: Side,
    rng: &mut R,
) -> TradeOutcome {
    match side {
        Side::Buy => market.buy(trader, symbol, rng),
        Side::Sell => market.sell(trader, symbol, rng),
    }
}

/// Peer-to-peer transfer of one share at the current market price.
///
/// The quote is read under a short market lock which is released before the
/// two trader locks are taken. The price is therefore the live price at the
/// moment of the call.
pub fn transfer(market: &Market, buyer: &Trader, seller: &Trader, symbol: &Symbol) -> TradeOutcome {
    if buyer.id() == seller.id() {
        return TradeOutcome::Declined(DeclineReason::SelfTrade);
    }
    match market.price(symbol) {
        Some(price) => transfer_at(buyer, seller, symbol, price),
        None => TradeOutcome::Declined(DeclineReason::UnknownSymbol),
    }
}

/// One share from `seller` to `buyer` for `price`, all four fields or none.
/// A price below 1 is declined before any lock is taken.
pub fn transfer_at(buyer: &Trader, seller: &Trader, symbol: &Symbol, price: i64) -> TradeOutcome {
    if price < 1 {
        return TradeOutcome::Declined(DeclineReason::InvalidPrice);
    }
    let Some(mut pair) = lock_pair(buyer, seller) else {
        return TradeOutcome::Declined(DeclineReason::SelfTrade);
    };
    let (b, s) = pair.split();

    if s.holding(symbol) == 0 {
        return TradeOutcome::Declined(DeclineReason::NoHoldings);
    }
    if !b.debit(price) {
        return TradeOutcome::Declined(DeclineReason::InsufficientCash);
    }
    s.remove_share(symbol);
    s.credit(price);
    b.add_share(symbol);
    TradeOutcome::Filled { price }
}
