use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IRegistry {
        function getAddressForString(string calldata identifier) external view returns (address);
    }
}
