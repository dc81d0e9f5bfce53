pub mod milligold;
pub mod wallgold;
pub mod wallgold_chart;
