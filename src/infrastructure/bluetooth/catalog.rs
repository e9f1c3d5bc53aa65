//! Service catalog of one GATT session
//!
//! `None` means discovery has never completed. `Some(vec![])` is a finished
//! discovery that found nothing.

use crate::domain::gatt::{
    AttributeId, AttributeTarget, CharacteristicPath, DescriptorPath, GattCharacteristic,
    GattDescriptor, GattService,
};
use crate::error::{BridgeError, EntityKind, Result};
use crate::infrastructure::bluetooth::protocol::MAX_ATTRIBUTE_LENGTH;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct ServiceCatalog {
    services: Option<Vec<GattService>>,
}

impl ServiceCatalog {
    pub fn is_discovered(&self) -> bool {
        self.services.is_some()
    }

    /// Discovered and holding at least one service
    pub fn has_services(&self) -> bool {
        self.services.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn services(&self) -> Option<&[GattService]> {
        self.services.as_deref()
    }

    /// Replace the whole catalog with a fresh discovery result
    pub fn replace(&mut self, services: Vec<GattService>) {
        self.services = Some(services);
    }

    /// Forget the catalog, e.g. after the link dropped
    pub fn reset(&mut self) {
        self.services = None;
    }

    /// Resolve service then characteristic by UUID, first match wins.
    /// Callers check `is_discovered` first.
    pub fn resolve_characteristic(
        &self,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Result<CharacteristicPath> {
        let services = self.services.as_deref().unwrap_or_default();

        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or(BridgeError::EntityNotFound {
                kind: EntityKind::Service,
                uuid: service_uuid,
            })?;

        let characteristic = service
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic_uuid)
            .ok_or(BridgeError::EntityNotFound {
                kind: EntityKind::Characteristic,
                uuid: characteristic_uuid,
            })?;

        Ok(CharacteristicPath {
            service: service.id(),
            characteristic: characteristic.id(),
        })
    }

    pub fn resolve_descriptor(
        &self,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        descriptor_uuid: Uuid,
    ) -> Result<DescriptorPath> {
        let path = self.resolve_characteristic(service_uuid, characteristic_uuid)?;

        self.characteristic(&path)
            .and_then(|c| c.descriptor(&descriptor_uuid))
            .ok_or(BridgeError::EntityNotFound {
                kind: EntityKind::Descriptor,
                uuid: descriptor_uuid,
            })?;

        Ok(DescriptorPath {
            characteristic: path,
            descriptor: descriptor_uuid,
        })
    }

    pub fn characteristic(&self, path: &CharacteristicPath) -> Option<&GattCharacteristic> {
        self.service(&path.service)?
            .characteristics
            .iter()
            .find(|c| c.id() == path.characteristic)
    }

    /// Current shadow value of an attribute
    pub fn value(&self, target: &AttributeTarget) -> Option<&[u8]> {
        match target {
            AttributeTarget::Characteristic(path) => {
                self.characteristic(path).map(|c| c.value.as_slice())
            }
            AttributeTarget::Descriptor(path) => self
                .characteristic(&path.characteristic)?
                .descriptor(&path.descriptor)
                .map(|d| d.value.as_slice()),
        }
    }

    /// Place `value` into the attribute's shadow copy.
    ///
    /// Fails when the attribute vanished from the catalog or the value does
    /// not fit into one attribute.
    pub fn buffer(&mut self, target: &AttributeTarget, value: &[u8]) -> bool {
        if value.len() > MAX_ATTRIBUTE_LENGTH {
            return false;
        }

        match self.shadow_mut(target) {
            Some(shadow) => {
                shadow.clear();
                shadow.extend_from_slice(value);
                true
            }
            None => false,
        }
    }

    fn service(&self, id: &AttributeId) -> Option<&GattService> {
        self.services.as_ref()?.iter().find(|s| s.id() == *id)
    }

    fn characteristic_mut(&mut self, path: &CharacteristicPath) -> Option<&mut GattCharacteristic> {
        self.services
            .as_mut()?
            .iter_mut()
            .find(|s| s.id() == path.service)?
            .characteristics
            .iter_mut()
            .find(|c| c.id() == path.characteristic)
    }

    fn descriptor_mut(&mut self, path: &DescriptorPath) -> Option<&mut GattDescriptor> {
        self.characteristic_mut(&path.characteristic)?
            .descriptors
            .iter_mut()
            .find(|d| d.uuid == path.descriptor)
    }

    fn shadow_mut(&mut self, target: &AttributeTarget) -> Option<&mut Vec<u8>> {
        match target {
            AttributeTarget::Characteristic(path) => {
                self.characteristic_mut(path).map(|c| &mut c.value)
            }
            AttributeTarget::Descriptor(path) => self.descriptor_mut(path).map(|d| &mut d.value),
        }
    }
}
