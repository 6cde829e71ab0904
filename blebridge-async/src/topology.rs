use blebridge::{Ble, Characteristic, DeviceHandle, Service};
use futures_util::future::try_join_all;
use tracing::warn;

use crate::error::Result;
use crate::util::call;

pub(crate) async fn read_service_tree(ble: &Ble, device: DeviceHandle) -> Result<Vec<Service>> {
    let services = call(|win, fail| ble.services(device, win, fail))
        .await
        .inspect_err(|error| warn!(%device, %error, query = "services", "service tree query failed"))?;

    try_join_all(
        services
            .into_iter()
            .map(|service| read_service(ble, device, service)),
    )
    .await
}

async fn read_service(ble: &Ble, device: DeviceHandle, mut service: Service) -> Result<Service> {
    let handle = service.handle;
    let characteristics = call(|win, fail| ble.characteristics(device, handle, win, fail))
        .await
        .inspect_err(|error| {
            warn!(%device, service = %handle, %error, query = "characteristics", "service tree query failed")
        })?;

    service.characteristics = try_join_all(
        characteristics
            .into_iter()
            .map(|characteristic| read_characteristic(ble, device, characteristic)),
    )
    .await?;
    Ok(service)
}

async fn read_characteristic(
    ble: &Ble,
    device: DeviceHandle,
    mut characteristic: Characteristic,
) -> Result<Characteristic> {
    let handle = characteristic.handle;
    characteristic.descriptors = call(|win, fail| ble.descriptors(device, handle, win, fail))
        .await
        .inspect_err(|error| {
            warn!(%device, characteristic = %handle, %error, query = "descriptors", "service tree query failed")
        })?;
    Ok(characteristic)
}
